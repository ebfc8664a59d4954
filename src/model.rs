// 该文件是 Yanqian （眼前） 项目的一部分。
// src/model.rs - 推理适配器契约与输出张量
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, preprocess::ModelInput};

/// 每个框的固定字段：cx, cy, w, h, objectness
pub const BOX_FIELDS: usize = 5;

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("模型加载错误: {0}")]
  ModelLoad(#[from] std::io::Error),
  #[error("模型文件无效: {0}")]
  InvalidModelFile(String),
  #[error("推理后端错误: {0}")]
  Backend(String),
  #[error("输出张量形状不符合预期 {shape:?}: {reason}")]
  UnexpectedShape { shape: Vec<usize>, reason: String },
  #[error("不支持的输出张量类型: {0}")]
  UnsupportedTensorType(String),
  #[error("模型 URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl InferenceError {
  pub fn shape(shape: &[usize], reason: impl Into<String>) -> Self {
    InferenceError::UnexpectedShape {
      shape: shape.to_vec(),
      reason: reason.into(),
    }
  }
}

/// 检测模型的推理契约
///
/// 流水线只负责喂入 S×S×3 的输入并读取单个输出张量，不关心模型本身。
/// 调用是同步的，返回之前流水线的处理步骤一直阻塞。
pub trait InferenceAdapter {
  /// 模型加载时确定的正方形输入边长 S
  fn input_size(&self) -> u32;

  fn infer(&self, input: &ModelInput) -> Result<OutputTensor, InferenceError>;
}

impl<T: InferenceAdapter + ?Sized> InferenceAdapter for Box<T> {
  fn input_size(&self) -> u32 {
    (**self).input_size()
  }

  fn infer(&self, input: &ModelInput) -> Result<OutputTensor, InferenceError> {
    (**self).infer(input)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
  Float32(Box<[f32]>),
  Int32(Box<[i32]>),
  UInt8(Box<[u8]>),
}

impl TensorData {
  pub fn len(&self) -> usize {
    match self {
      TensorData::Float32(d) => d.len(),
      TensorData::Int32(d) => d.len(),
      TensorData::UInt8(d) => d.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      TensorData::Float32(_) => "float32",
      TensorData::Int32(_) => "int32",
      TensorData::UInt8(_) => "uint8",
    }
  }

  /// 统一拓宽为 f32
  pub fn widen(&self) -> Vec<f32> {
    match self {
      TensorData::Float32(d) => d.to_vec(),
      TensorData::Int32(d) => d.iter().map(|&v| v as f32).collect(),
      TensorData::UInt8(d) => d.iter().map(|&v| v as f32).collect(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  shape: Vec<usize>,
  data: TensorData,
}

impl OutputTensor {
  pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self, InferenceError> {
    let expected = shape
      .iter()
      .try_fold(1usize, |acc, &extent| acc.checked_mul(extent))
      .ok_or_else(|| InferenceError::shape(&shape, "元素数量溢出"))?;
    if shape.is_empty() || expected != data.len() {
      return Err(InferenceError::shape(
        &shape,
        format!("元素数量 {} 与形状不符", data.len()),
      ));
    }
    Ok(Self { shape, data })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn rank(&self) -> usize {
    self.shape.len()
  }

  pub fn data(&self) -> &TensorData {
    &self.data
  }

  /// 按 `[1, N, V]` 或 `[N, V]` 布局读出逐框数据，拓宽只在这里发生一次
  pub fn rows(&self) -> Result<TensorRows, InferenceError> {
    let (num_boxes, values_per_box) = match *self.shape.as_slice() {
      [1, n, v] => (n, v),
      [b, _, _] => {
        return Err(InferenceError::shape(
          &self.shape,
          format!("批大小必须为 1, 实际为 {}", b),
        ));
      }
      [n, v] => (n, v),
      _ => {
        return Err(InferenceError::shape(
          &self.shape,
          format!("张量维数必须为 2 或 3, 实际为 {}", self.rank()),
        ));
      }
    };
    if values_per_box <= BOX_FIELDS {
      return Err(InferenceError::shape(
        &self.shape,
        format!("每框数值 {} 不足以包含类别分数", values_per_box),
      ));
    }
    Ok(TensorRows {
      num_boxes,
      values_per_box,
      values: self.data.widen(),
    })
  }
}

/// 拓宽后的逐框视图
#[derive(Debug, Clone)]
pub struct TensorRows {
  num_boxes: usize,
  values_per_box: usize,
  values: Vec<f32>,
}

impl TensorRows {
  pub fn num_boxes(&self) -> usize {
    self.num_boxes
  }

  pub fn num_classes(&self) -> usize {
    self.values_per_box - BOX_FIELDS
  }

  pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
    self.values.chunks_exact(self.values_per_box)
  }
}

mod labels;
pub use self::labels::{COCO_CLASSES, ClassTable, UNKNOWN_LABEL};

mod replay;
pub use self::replay::ReplayModel;

#[cfg(feature = "model_rknn")]
mod rknn;
#[cfg(feature = "model_rknn")]
pub use self::rknn::{RknnModel, RknnModelBuilder};

pub enum ModelWrapper {
  Replay(ReplayModel),
  #[cfg(feature = "model_rknn")]
  Rknn(RknnModel),
}

impl FromUrl for ModelWrapper {
  type Error = InferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayModel::SCHEME => Ok(ModelWrapper::Replay(ReplayModel::from_url(url)?)),
      #[cfg(feature = "model_rknn")]
      RknnModelBuilder::SCHEME => Ok(ModelWrapper::Rknn(
        RknnModelBuilder::from_url(url)?.build()?,
      )),
      other => Err(InferenceError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InferenceAdapter for ModelWrapper {
  fn input_size(&self) -> u32 {
    match self {
      ModelWrapper::Replay(model) => model.input_size(),
      #[cfg(feature = "model_rknn")]
      ModelWrapper::Rknn(model) => model.input_size(),
    }
  }

  fn infer(&self, input: &ModelInput) -> Result<OutputTensor, InferenceError> {
    match self {
      ModelWrapper::Replay(model) => model.infer(input),
      #[cfg(feature = "model_rknn")]
      ModelWrapper::Rknn(model) => model.infer(input),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn widens_all_element_types() {
    assert_eq!(
      TensorData::Int32(vec![-3, 7].into()).widen(),
      vec![-3.0, 7.0]
    );
    assert_eq!(
      TensorData::UInt8(vec![0, 255].into()).widen(),
      vec![0.0, 255.0]
    );
    assert_eq!(
      TensorData::Float32(vec![0.5].into()).widen(),
      vec![0.5]
    );
  }

  #[test]
  fn accepts_batched_and_flat_layouts() {
    let data = TensorData::Float32(vec![0.0; 12].into());
    let batched = OutputTensor::new(vec![1, 2, 6], data.clone()).unwrap();
    let flat = OutputTensor::new(vec![2, 6], data).unwrap();
    for tensor in [batched, flat] {
      let rows = tensor.rows().unwrap();
      assert_eq!(rows.num_boxes(), 2);
      assert_eq!(rows.num_classes(), 1);
      assert_eq!(rows.iter().count(), 2);
    }
  }

  #[test]
  fn rejects_unexpected_shapes() {
    let data = TensorData::Float32(vec![0.0; 12].into());
    assert!(OutputTensor::new(vec![5, 6], data.clone()).is_err());
    let rank_one = OutputTensor::new(vec![12], data.clone()).unwrap();
    assert!(matches!(
      rank_one.rows(),
      Err(InferenceError::UnexpectedShape { .. })
    ));
    let batch_two = OutputTensor::new(vec![2, 1, 6], data.clone()).unwrap();
    assert!(batch_two.rows().is_err());
    let no_classes = OutputTensor::new(vec![1, 3, 4], TensorData::UInt8(vec![0; 12].into())).unwrap();
    assert!(no_classes.rows().is_err());
  }

  #[test]
  fn overflowing_shape_is_rejected() {
    let data = TensorData::Float32(Vec::new().into());
    assert!(matches!(
      OutputTensor::new(vec![usize::MAX / 2, 4, 6], data),
      Err(InferenceError::UnexpectedShape { .. })
    ));
  }
}
