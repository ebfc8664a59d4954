// 该文件是 Yanqian （眼前） 项目的一部分。
// src/model/replay.rs - 回放录制的输出张量
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

//! 每帧返回同一个预先录制的输出张量，用于没有加速器时的确定性运行。
//!
//! 张量文件为 JSON：
//!
//! ```json
//! {"input_size": 640, "shape": [1, 2, 85], "dtype": "float32", "data": [...]}
//! ```
//!
//! `dtype` 取 `float32`、`int32` 或 `uint8`，缺省为 `float32`；
//! URL 查询参数 `size` 可覆盖 `input_size`。

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  model::{InferenceAdapter, InferenceError, OutputTensor, TensorData},
  preprocess::ModelInput,
};

const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Clone)]
pub struct ReplayModel {
  input_size: u32,
  tensor: OutputTensor,
}

impl ReplayModel {
  pub fn new(input_size: u32, tensor: OutputTensor) -> Self {
    Self { input_size, tensor }
  }

  pub fn from_json(text: &str) -> Result<Self, InferenceError> {
    let value: Value =
      serde_json::from_str(text).map_err(|e| InferenceError::InvalidModelFile(e.to_string()))?;

    let input_size = match value.get("input_size") {
      Some(v) => v
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| InferenceError::InvalidModelFile(format!("input_size 无效: {}", v)))?,
      None => DEFAULT_INPUT_SIZE,
    };

    let shape = value
      .get("shape")
      .and_then(Value::as_array)
      .ok_or_else(|| InferenceError::InvalidModelFile("缺少 shape 字段".to_string()))?
      .iter()
      .map(|v| {
        v.as_u64()
          .and_then(|n| usize::try_from(n).ok())
          .ok_or_else(|| InferenceError::InvalidModelFile(format!("shape 元素无效: {}", v)))
      })
      .collect::<Result<Vec<_>, _>>()?;

    let raw = value
      .get("data")
      .and_then(Value::as_array)
      .ok_or_else(|| InferenceError::InvalidModelFile("缺少 data 字段".to_string()))?;

    let dtype = value
      .get("dtype")
      .and_then(Value::as_str)
      .unwrap_or("float32");

    let data = match dtype {
      "float32" => TensorData::Float32(collect_values(raw, |v| v.as_f64().map(|f| f as f32))?),
      "int32" => TensorData::Int32(collect_values(raw, |v| {
        v.as_i64().and_then(|i| i32::try_from(i).ok())
      })?),
      "uint8" => TensorData::UInt8(collect_values(raw, |v| {
        v.as_u64().and_then(|i| u8::try_from(i).ok())
      })?),
      other => return Err(InferenceError::UnsupportedTensorType(other.to_string())),
    };

    debug!(
      "回放张量: 形状 {:?}, 类型 {}, 输入尺寸 {}",
      shape, dtype, input_size
    );

    Ok(Self::new(input_size, OutputTensor::new(shape, data)?))
  }

  pub fn with_input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn tensor(&self) -> &OutputTensor {
    &self.tensor
  }
}

fn collect_values<T>(
  raw: &[Value],
  convert: impl Fn(&Value) -> Option<T>,
) -> Result<Box<[T]>, InferenceError> {
  raw
    .iter()
    .map(|v| {
      convert(v).ok_or_else(|| InferenceError::InvalidModelFile(format!("张量元素无效: {}", v)))
    })
    .collect()
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = InferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InferenceError::SchemeMismatch(format!(
        "期望 '{}', 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = decode_url_path(url);
    info!("加载回放张量文件: {}", path.display());
    let text = std::fs::read_to_string(&path)?;
    let mut model = Self::from_json(&text)?;

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "size" => {
          let size = value
            .parse()
            .map_err(|_| InferenceError::InvalidModelFile(format!("输入尺寸无效: {}", value)))?;
          model = model.with_input_size(size);
        }
        other => debug!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(model)
  }
}

impl InferenceAdapter for ReplayModel {
  fn input_size(&self) -> u32 {
    self.input_size
  }

  fn infer(&self, input: &ModelInput) -> Result<OutputTensor, InferenceError> {
    if input.size() != self.input_size {
      return Err(InferenceError::Backend(format!(
        "输入尺寸 {} 与模型输入尺寸 {} 不一致",
        input.size(),
        self.input_size
      )));
    }
    Ok(self.tensor.clone())
  }
}
