// 该文件是 Yanqian （眼前） 项目的一部分。
// src/pipeline.rs - 单帧检测流水线
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

//! 帧解码 → 预处理 → 推理 → 解码 → 抑制 → 距离估计。
//!
//! 每帧独立处理，不保留跨帧状态。单帧失败只影响该帧：
//! [`Pipeline::run`] 会把错误转成带诊断信息的空报告。

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  config::{ConfigError, PipelineConfig},
  decode::DetectionDecoder,
  detection::Detection,
  distance::DistanceEstimator,
  frame::{FrameDecoder, FrameError, RawFrame},
  model::{ClassTable, InferenceAdapter, InferenceError},
  preprocess::Preprocessor,
  suppress::Suppressor,
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("不支持的帧格式: {0}")]
  UnsupportedFormat(String),
  #[error("无效帧: {0}")]
  InvalidFrame(String),
  #[error("推理失败: {0}")]
  Inference(InferenceError),
  #[error("不支持的输出张量类型: {0}")]
  UnsupportedTensorType(String),
}

impl From<FrameError> for PipelineError {
  fn from(err: FrameError) -> Self {
    match err {
      FrameError::UnsupportedFormat(msg) => PipelineError::UnsupportedFormat(msg),
      FrameError::InvalidFrame(msg) => PipelineError::InvalidFrame(msg),
    }
  }
}

impl From<InferenceError> for PipelineError {
  fn from(err: InferenceError) -> Self {
    match err {
      InferenceError::UnsupportedTensorType(ty) => PipelineError::UnsupportedTensorType(ty),
      other => PipelineError::Inference(other),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
  pub decode: Duration,
  pub preprocess: Duration,
  pub inference: Duration,
  pub postprocess: Duration,
}

impl StageTimings {
  pub fn total(&self) -> Duration {
    self.decode + self.preprocess + self.inference + self.postprocess
  }
}

/// 一帧的处理结果
#[derive(Debug, Clone)]
pub struct FrameReport {
  pub index: u64,
  /// 旋转后的帧尺寸，失败帧为 0
  pub width: u32,
  pub height: u32,
  pub detections: Arc<[Detection]>,
  pub timings: Option<StageTimings>,
  pub diagnostic: Option<String>,
}

impl FrameReport {
  pub fn failed(index: u64, diagnostic: impl Into<String>) -> Self {
    Self {
      index,
      width: 0,
      height: 0,
      detections: Arc::from(Vec::new()),
      timings: None,
      diagnostic: Some(diagnostic.into()),
    }
  }

  pub fn is_failed(&self) -> bool {
    self.diagnostic.is_some()
  }
}

/// [`Pipeline::process`] 的成功结果
#[derive(Debug, Clone)]
pub struct Processed {
  pub width: u32,
  pub height: u32,
  pub detections: Vec<Detection>,
  pub timings: StageTimings,
}

pub struct Pipeline<M> {
  model: M,
  classes: ClassTable,
  frame_decoder: FrameDecoder,
  preprocessor: Preprocessor,
  decoder: DetectionDecoder,
  suppressor: Suppressor,
  estimator: DistanceEstimator,
}

impl<M: InferenceAdapter> Pipeline<M> {
  /// 校验配置并确定模型输入尺寸，之后尺寸不再改变
  pub fn new(config: PipelineConfig, model: M, classes: ClassTable) -> Result<Self, ConfigError> {
    config.validate()?;
    let size = config.resolve_input_size(model.input_size())?;
    debug!(
      "流水线配置: 输入尺寸 {}, 置信度阈值 {}, IoU 阈值 {}, 类别数量 {}",
      size,
      config.confidence_threshold,
      config.iou_threshold,
      classes.len()
    );

    Ok(Self {
      model,
      classes,
      frame_decoder: FrameDecoder,
      preprocessor: Preprocessor::new(size, config.channel_order),
      decoder: DetectionDecoder::new(config.confidence_threshold, config.box_encoding),
      suppressor: Suppressor::new(
        config.iou_threshold,
        config.suppression_scope,
        config.max_detections,
      ),
      estimator: DistanceEstimator::new(config.distance),
    })
  }

  pub fn input_size(&self) -> u32 {
    self.preprocessor.size()
  }

  pub fn classes(&self) -> &ClassTable {
    &self.classes
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn process(&self, frame: &RawFrame) -> Result<Processed, PipelineError> {
    let start = Instant::now();
    let raster = self.frame_decoder.decode(frame)?;
    let decoded = Instant::now();

    let (input, transform) = self.preprocessor.preprocess(&raster)?;
    let preprocessed = Instant::now();

    let tensor = self.model.infer(&input)?;
    let inferred = Instant::now();

    let candidates = self.decoder.decode(&tensor, &transform, &self.classes)?;
    let kept = self.suppressor.suppress(candidates);
    let detections = self.estimator.annotate(kept, raster.height());
    let finished = Instant::now();

    let timings = StageTimings {
      decode: decoded - start,
      preprocess: preprocessed - decoded,
      inference: inferred - preprocessed,
      postprocess: finished - inferred,
    };
    debug!("帧处理耗时: {:?}", timings);

    Ok(Processed {
      width: raster.width(),
      height: raster.height(),
      detections,
      timings,
    })
  }

  /// 处理一帧，失败时返回带诊断信息的空报告
  pub fn run(&self, index: u64, frame: &RawFrame) -> FrameReport {
    match self.process(frame) {
      Ok(processed) => FrameReport {
        index,
        width: processed.width,
        height: processed.height,
        detections: processed.detections.into(),
        timings: Some(processed.timings),
        diagnostic: None,
      },
      Err(e) => {
        warn!("第 {} 帧处理失败: {}", index, e);
        FrameReport::failed(index, e.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::{ChromaSubsampling, Plane},
    model::{OutputTensor, ReplayModel, TensorData},
  };

  fn person_model(size: u32) -> ReplayModel {
    let mut row = vec![size as f32 / 2.0, size as f32 / 2.0, 40.0, 80.0, 0.9, 0.8];
    row.extend(std::iter::repeat_n(0.0, 79));
    let tensor = OutputTensor::new(vec![1, 1, 85], TensorData::Float32(row.into())).unwrap();
    ReplayModel::new(size, tensor)
  }

  fn gray_frame(width: u32, height: u32) -> RawFrame {
    let len = RawFrame::yuv420_frame_len(width, height);
    RawFrame::from_i420(width, height, &vec![128; len]).unwrap()
  }

  #[test]
  fn processes_a_frame_end_to_end() {
    let pipeline =
      Pipeline::new(PipelineConfig::default(), person_model(320), ClassTable::coco()).unwrap();
    let report = pipeline.run(7, &gray_frame(64, 48));
    assert_eq!(report.index, 7);
    assert!(!report.is_failed());
    assert_eq!((report.width, report.height), (64, 48));
    assert_eq!(report.detections.len(), 1);
    assert_eq!(report.detections[0].label, "person");
    assert!(report.detections[0].distance.meters().is_some());
    assert!(report.timings.is_some());
  }

  #[test]
  fn failed_frames_become_empty_reports() {
    let pipeline =
      Pipeline::new(PipelineConfig::default(), person_model(320), ClassTable::coco()).unwrap();
    let bad = RawFrame::new(
      4,
      4,
      ChromaSubsampling::YUV420,
      vec![Plane::new(vec![0u8; 16], 4, 1)],
    );
    let report = pipeline.run(1, &bad);
    assert!(report.is_failed());
    assert!(report.detections.is_empty());
    assert!(matches!(
      pipeline.process(&bad),
      Err(PipelineError::UnsupportedFormat(_))
    ));
  }

  #[test]
  fn tensor_type_errors_are_surfaced() {
    assert!(matches!(
      PipelineError::from(InferenceError::UnsupportedTensorType("float16".into())),
      PipelineError::UnsupportedTensorType(_)
    ));
    assert!(matches!(
      PipelineError::from(InferenceError::Backend("boom".into())),
      PipelineError::Inference(_)
    ));
  }

  #[test]
  fn rejects_mismatched_input_size() {
    let config = PipelineConfig::default().with_input_size(Some(640));
    assert!(matches!(
      Pipeline::new(config, person_model(320), ClassTable::coco()),
      Err(ConfigError::InputSizeMismatch { .. })
    ));
    let config = PipelineConfig::default().with_input_size(Some(320));
    let pipeline = Pipeline::new(config, person_model(320), ClassTable::coco()).unwrap();
    assert_eq!(pipeline.input_size(), 320);
  }
}
