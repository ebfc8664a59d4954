// 该文件是 Yanqian （眼前） 项目的一部分。
// src/distance.rs - 单目距离启发式估计
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

//! 由检测框高度推算的近远距离。
//!
//! 默认使用针孔模型 `距离 = 参考高度 × 焦距 / (像素高度 + ε)`，
//! 参考高度 1.7 米、焦距 1000 像素。另有反比例模型
//! `距离 = clamp(k / 相对高度, 最小值, 最大值)` 可选。
//! 两者都只是近似值，输出中一律标注为估计。

use crate::{
  config::ConfigError,
  detection::{Detection, DistanceEstimate},
};

pub const DEFAULT_REFERENCE_HEIGHT_M: f32 = 1.7;
pub const DEFAULT_FOCAL_LENGTH_PX: f32 = 1000.0;
pub const DEFAULT_INVERSE_K: f32 = 1.5;
pub const DEFAULT_INVERSE_MIN_M: f32 = 0.3;
pub const DEFAULT_INVERSE_MAX_M: f32 = 30.0;
const PINHOLE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceHeuristic {
  Pinhole {
    reference_height_m: f32,
    focal_length_px: f32,
  },
  InverseProportional {
    k: f32,
    min_m: f32,
    max_m: f32,
  },
}

impl Default for DistanceHeuristic {
  fn default() -> Self {
    DistanceHeuristic::Pinhole {
      reference_height_m: DEFAULT_REFERENCE_HEIGHT_M,
      focal_length_px: DEFAULT_FOCAL_LENGTH_PX,
    }
  }
}

impl DistanceHeuristic {
  pub fn inverse_proportional() -> Self {
    DistanceHeuristic::InverseProportional {
      k: DEFAULT_INVERSE_K,
      min_m: DEFAULT_INVERSE_MIN_M,
      max_m: DEFAULT_INVERSE_MAX_M,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let positive = |v: f32| v.is_finite() && v > 0.0;
    match *self {
      DistanceHeuristic::Pinhole {
        reference_height_m,
        focal_length_px,
      } => {
        if !positive(reference_height_m) || !positive(focal_length_px) {
          return Err(ConfigError::InvalidDistance(format!(
            "参考高度 {} 与焦距 {} 必须为正数",
            reference_height_m, focal_length_px
          )));
        }
      }
      DistanceHeuristic::InverseProportional { k, min_m, max_m } => {
        if !positive(k) || !positive(min_m) || !positive(max_m) || min_m > max_m {
          return Err(ConfigError::InvalidDistance(format!(
            "k={} 最小值={} 最大值={} 不合法",
            k, min_m, max_m
          )));
        }
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceEstimator {
  heuristic: DistanceHeuristic,
}

impl DistanceEstimator {
  pub fn new(heuristic: DistanceHeuristic) -> Self {
    Self { heuristic }
  }

  /// `relative_height` 为框高占帧高的比例，`frame_height_px` 为帧高像素数
  pub fn estimate(&self, relative_height: f32, frame_height_px: u32) -> DistanceEstimate {
    if !relative_height.is_finite() || relative_height <= 0.0 {
      return DistanceEstimate::Unknown;
    }

    let meters = match self.heuristic {
      DistanceHeuristic::Pinhole {
        reference_height_m,
        focal_length_px,
      } => {
        let pixel_height = relative_height * frame_height_px as f32;
        reference_height_m * focal_length_px / (pixel_height + PINHOLE_EPSILON)
      }
      DistanceHeuristic::InverseProportional { k, min_m, max_m } => {
        (k / relative_height).clamp(min_m, max_m)
      }
    };

    if meters.is_finite() && meters > 0.0 {
      DistanceEstimate::Meters(meters)
    } else {
      DistanceEstimate::Unknown
    }
  }

  pub fn annotate(&self, detections: Vec<Detection>, frame_height_px: u32) -> Vec<Detection> {
    detections
      .into_iter()
      .map(|det| {
        let distance = self.estimate(det.height(), frame_height_px);
        det.with_distance(distance)
      })
      .collect()
  }
}
