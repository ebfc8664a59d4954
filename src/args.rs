// 该文件是 Yanqian （眼前） 项目的一部分。
// src/args.rs - 流水线命令行参数
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

use std::path::PathBuf;

use clap::Args;

use crate::{
  config::{
    BoxEncoding, ChannelOrder, ConfigError, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD,
    DEFAULT_MAX_DETECTIONS, DistanceModel, PipelineConfig, SuppressionScope,
  },
  distance::{
    DEFAULT_FOCAL_LENGTH_PX, DEFAULT_INVERSE_K, DEFAULT_INVERSE_MAX_M, DEFAULT_INVERSE_MIN_M,
    DEFAULT_REFERENCE_HEIGHT_M, DistanceHeuristic,
  },
  model::{ClassTable, InferenceError},
};

/// 各个程序共用的流水线参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 模型输入边长，缺省使用模型报告的尺寸
  #[arg(long, value_name = "SIZE")]
  pub input_size: Option<u32>,

  /// 抑制范围
  #[arg(long, value_enum, default_value_t = SuppressionScope::PerLabel)]
  pub scope: SuppressionScope,

  /// 每帧最多保留的检测数量
  #[arg(long, default_value_t = DEFAULT_MAX_DETECTIONS, value_name = "COUNT")]
  pub max_detections: usize,

  /// 模型输出框的坐标约定
  #[arg(long, value_enum, default_value_t = BoxEncoding::Auto)]
  pub box_encoding: BoxEncoding,

  /// 模型输入通道顺序
  #[arg(long, value_enum, default_value_t = ChannelOrder::Rgb)]
  pub channel_order: ChannelOrder,

  /// 距离估计公式
  #[arg(long, value_enum, default_value_t = DistanceModel::Pinhole)]
  pub distance_heuristic: DistanceModel,

  /// 反比例模型的系数 k
  #[arg(long, default_value_t = DEFAULT_INVERSE_K, value_name = "K")]
  pub distance_k: f32,

  /// 距离估计假设的目标高度（米）
  #[arg(long, default_value_t = DEFAULT_REFERENCE_HEIGHT_M, value_name = "METERS")]
  pub reference_height: f32,

  /// 距离估计使用的焦距（像素）
  #[arg(long, default_value_t = DEFAULT_FOCAL_LENGTH_PX, value_name = "PIXELS")]
  pub focal_length: f32,

  /// 类别标签文件，每行一个，缺省使用 COCO 80 类
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
}

impl PipelineArgs {
  pub fn to_config(&self) -> Result<PipelineConfig, ConfigError> {
    let config = PipelineConfig::default()
      .with_confidence_threshold(self.confidence)
      .with_iou_threshold(self.nms_threshold)
      .with_input_size(self.input_size)
      .with_suppression_scope(self.scope)
      .with_max_detections(self.max_detections)
      .with_box_encoding(self.box_encoding)
      .with_channel_order(self.channel_order)
      .with_distance(self.distance());
    config.validate()?;
    Ok(config)
  }

  fn distance(&self) -> DistanceHeuristic {
    match self.distance_heuristic {
      DistanceModel::Pinhole => DistanceHeuristic::Pinhole {
        reference_height_m: self.reference_height,
        focal_length_px: self.focal_length,
      },
      DistanceModel::Inverse => DistanceHeuristic::InverseProportional {
        k: self.distance_k,
        min_m: DEFAULT_INVERSE_MIN_M,
        max_m: DEFAULT_INVERSE_MAX_M,
      },
    }
  }

  pub fn class_table(&self) -> Result<ClassTable, InferenceError> {
    match &self.labels {
      Some(path) => ClassTable::from_file(path),
      None => Ok(ClassTable::coco()),
    }
  }
}
