// 该文件是 Yanqian （眼前） 项目的一部分。
// src/config.rs - 流水线配置
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

use clap::ValueEnum;
use thiserror::Error;

use crate::distance::DistanceHeuristic;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.35;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MAX_DETECTIONS: usize = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("阈值 {name} 必须位于 [0, 1] 区间, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("最大检测数量必须大于 0")]
  ZeroMaxDetections,
  #[error("模型输入尺寸无效: {0}")]
  InvalidInputSize(u32),
  #[error("配置的输入尺寸 {configured} 与模型输入尺寸 {model} 不一致")]
  InputSizeMismatch { configured: u32, model: u32 },
  #[error("距离估计参数无效: {0}")]
  InvalidDistance(String),
}

/// 抑制范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SuppressionScope {
  /// 仅抑制同标签的框
  #[default]
  PerLabel,
  /// 跨类别抑制
  Global,
}

/// 模型输出框的坐标约定
///
/// `Auto` 在四个值都不超过 1.0 时视为归一化坐标，否则视为模型输入像素。
/// 对接近单位尺寸的框该判断存在歧义，已知模型约定时应显式指定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BoxEncoding {
  #[default]
  Auto,
  Normalized,
  Pixels,
}

/// 距离估计公式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DistanceModel {
  /// 针孔模型，需要参考高度与焦距
  #[default]
  Pinhole,
  /// 反比例模型，按框高占帧高的比例估计
  Inverse,
}

/// 模型期望的输入通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  /// 为 `None` 时使用模型报告的输入尺寸
  pub input_size: Option<u32>,
  pub suppression_scope: SuppressionScope,
  pub max_detections: usize,
  pub box_encoding: BoxEncoding,
  pub channel_order: ChannelOrder,
  pub distance: DistanceHeuristic,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      input_size: None,
      suppression_scope: SuppressionScope::default(),
      max_detections: DEFAULT_MAX_DETECTIONS,
      box_encoding: BoxEncoding::default(),
      channel_order: ChannelOrder::default(),
      distance: DistanceHeuristic::default(),
    }
  }
}

impl PipelineConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn with_input_size(mut self, size: Option<u32>) -> Self {
    self.input_size = size;
    self
  }

  pub fn with_suppression_scope(mut self, scope: SuppressionScope) -> Self {
    self.suppression_scope = scope;
    self
  }

  pub fn with_max_detections(mut self, max: usize) -> Self {
    self.max_detections = max;
    self
  }

  pub fn with_box_encoding(mut self, encoding: BoxEncoding) -> Self {
    self.box_encoding = encoding;
    self
  }

  pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
    self.channel_order = order;
    self
  }

  pub fn with_distance(mut self, distance: DistanceHeuristic) -> Self {
    self.distance = distance;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("confidence", self.confidence_threshold),
      ("iou", self.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }
    if self.max_detections == 0 {
      return Err(ConfigError::ZeroMaxDetections);
    }
    if self.input_size == Some(0) {
      return Err(ConfigError::InvalidInputSize(0));
    }
    self.distance.validate()
  }

  /// 确定会话内固定的模型输入尺寸
  pub fn resolve_input_size(&self, model_size: u32) -> Result<u32, ConfigError> {
    if model_size == 0 {
      return Err(ConfigError::InvalidInputSize(model_size));
    }
    match self.input_size {
      Some(configured) if configured != model_size => Err(ConfigError::InputSizeMismatch {
        configured,
        model: model_size,
      }),
      _ => Ok(model_size),
    }
  }
}
