// 该文件是 Yanqian （眼前） 项目的一部分。
// src/model/rknn.rs - RKNN 推理后端
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  model::{BOX_FIELDS, InferenceAdapter, InferenceError, OutputTensor, TensorData},
  preprocess::ModelInput,
};

const RKNN_NUM_INPUTS: u32 = 1;
const RKNN_NUM_OUTPUTS: u32 = 1;
const RKNN_DEFAULT_INPUT_SIZE: u32 = 640;
const RKNN_DEFAULT_CLASSES: usize = 80;

fn backend(msg: &str, e: rknpu::Error) -> InferenceError {
  InferenceError::Backend(format!("{}: {}", msg, e))
}

pub struct RknnModel {
  context: Context,
  input_size: u32,
  values_per_box: usize,
}

/// 通过 `rknn://<path>?size=640&classes=80` 构造
pub struct RknnModelBuilder {
  model_path: PathBuf,
  input_size: u32,
  num_classes: usize,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnModelBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnModelBuilder {
  type Error = InferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InferenceError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = RknnModelBuilder {
      model_path: decode_url_path(url),
      input_size: RKNN_DEFAULT_INPUT_SIZE,
      num_classes: RKNN_DEFAULT_CLASSES,
      flags: InitFlags::default(),
    };

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "size" => {
          builder.input_size = value
            .parse()
            .map_err(|_| InferenceError::InvalidModelFile(format!("输入尺寸无效: {}", value)))?;
        }
        "classes" => {
          builder.num_classes = value
            .parse()
            .map_err(|_| InferenceError::InvalidModelFile(format!("类别数量无效: {}", value)))?;
        }
        other => debug!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl RknnModelBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnModel, InferenceError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context =
      Context::new(&model_data, self.flags).map_err(|e| backend("无法创建推理上下文", e))?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(backend("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| backend("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| backend("无法获取输出数量", e))?;

    if num_inputs != RKNN_NUM_INPUTS || num_outputs != RKNN_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        RKNN_NUM_INPUTS, RKNN_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(InferenceError::InvalidModelFile(msg));
    }

    info!(
      "模型加载完成, 输入尺寸 {}, 类别数量 {}",
      self.input_size, self.num_classes
    );
    Ok(RknnModel {
      context,
      input_size: self.input_size,
      values_per_box: BOX_FIELDS + self.num_classes,
    })
  }
}

impl InferenceAdapter for RknnModel {
  fn input_size(&self) -> u32 {
    self.input_size
  }

  fn infer(&self, input: &ModelInput) -> Result<OutputTensor, InferenceError> {
    debug!("设置模型输入");
    self
      .context
      .set_input(0, &input.to_u8_hwc(), TensorFormat::NHWC, TensorType::UInt8)
      .map_err(|e| backend("设置输入失败", e))?;

    debug!("执行模型推理");
    self.context.run().map_err(|e| backend("推理失败", e))?;

    let outputs = self
      .context
      .get_outputs()
      .map_err(|e| backend("获取输出失败", e))?;
    let values = outputs
      .get_f32(0)
      .map_err(|e| backend("读取输出张量失败", e))?;

    if values.len() % self.values_per_box != 0 {
      return Err(InferenceError::shape(
        &[values.len()],
        format!("元素数量不能被每框数值 {} 整除", self.values_per_box),
      ));
    }
    let num_boxes = values.len() / self.values_per_box;
    debug!("模型输出 {} 个候选框", num_boxes);

    OutputTensor::new(
      vec![1, num_boxes, self.values_per_box],
      TensorData::Float32(values.to_vec().into_boxed_slice()),
    )
  }
}
