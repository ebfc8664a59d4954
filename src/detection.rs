// 该文件是 Yanqian （眼前） 项目的一部分。
// src/detection.rs - 检测结果定义
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

/// 粗略距离估计，不是经过标定的测量值
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DistanceEstimate {
  Meters(f32),
  #[default]
  Unknown,
}

impl DistanceEstimate {
  pub fn meters(&self) -> Option<f32> {
    match self {
      DistanceEstimate::Meters(m) => Some(*m),
      DistanceEstimate::Unknown => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: u32,
  pub label: String,
  /// 目标置信度 × 最佳类别分数，[0, 1]
  pub confidence: f32,
  pub bbox: [f32; 4], // [left, top, right, bottom]，相对原始帧归一化
  pub distance: DistanceEstimate,
}

impl Detection {
  pub fn new(class_id: u32, label: impl Into<String>, confidence: f32, bbox: [f32; 4]) -> Self {
    Self {
      class_id,
      label: label.into(),
      confidence,
      bbox,
      distance: DistanceEstimate::Unknown,
    }
  }

  pub fn with_distance(mut self, distance: DistanceEstimate) -> Self {
    self.distance = distance;
    self
  }

  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  pub fn center(&self) -> (f32, f32) {
    (
      (self.bbox[0] + self.bbox[2]) / 2.0,
      (self.bbox[1] + self.bbox[3]) / 2.0,
    )
  }
}
