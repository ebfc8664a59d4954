// 该文件是 Yanqian （眼前） 项目的一部分。
// src/suppress.rs - 非极大值抑制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use tracing::debug;

use crate::{
  config::{DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_DETECTIONS, SuppressionScope},
  detection::Detection,
};

/// 计算两个 `[left, top, right, bottom]` 边界框的 IoU
///
/// 面积非正的框或并集非正时返回 0。
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let area = |r: &[f32; 4]| (r[2] - r[0]) * (r[3] - r[1]);
  let area_a = area(a);
  let area_b = area(b);
  if !(area_a > 0.0) || !(area_b > 0.0) {
    return 0.0;
  }

  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Suppressor {
  iou_threshold: f32,
  scope: SuppressionScope,
  max_detections: usize,
}

impl Default for Suppressor {
  fn default() -> Self {
    Self::new(
      DEFAULT_IOU_THRESHOLD,
      SuppressionScope::default(),
      DEFAULT_MAX_DETECTIONS,
    )
  }
}

impl Suppressor {
  pub fn new(iou_threshold: f32, scope: SuppressionScope, max_detections: usize) -> Self {
    Self {
      iou_threshold,
      scope,
      max_detections,
    }
  }

  fn in_scope(&self, a: &Detection, b: &Detection) -> bool {
    match self.scope {
      SuppressionScope::Global => true,
      SuppressionScope::PerLabel => a.label == b.label,
    }
  }

  /// 返回按置信度降序、最多 `max_detections` 个的去重结果
  pub fn suppress(&self, mut detections: Vec<Detection>) -> Vec<Detection> {
    let candidates = detections.len();
    // 稳定排序，置信度相同时保持原有顺序
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(self.max_detections.min(candidates));
    for det in detections {
      if kept.len() >= self.max_detections {
        break;
      }
      let overlaps = kept
        .iter()
        .any(|k| self.in_scope(k, &det) && iou(&k.bbox, &det.bbox) > self.iou_threshold);
      if !overlaps {
        kept.push(det);
      }
    }

    debug!("抑制后保留 {}/{} 个检测", kept.len(), candidates);
    kept
  }
}
