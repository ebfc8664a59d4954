// 该文件是 Yanqian （眼前） 项目的一部分。
// src/output.rs - 检测结果输出
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

use crate::{FromUrl, FromUrlWithScheme, pipeline::FrameReport};

pub trait Render: Sized {
  type Error;
  fn render_result(&self, report: &FrameReport) -> Result<(), Self::Error>;
}

mod log;
pub use self::log::LogOutput;

#[cfg(feature = "jsonl_output")]
mod jsonl;
#[cfg(feature = "jsonl_output")]
pub use self::jsonl::JsonLinesOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[cfg(feature = "jsonl_output")]
  #[error("JSON 序列化错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  Log(LogOutput),
  #[cfg(feature = "jsonl_output")]
  JsonLines(JsonLinesOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      #[cfg(feature = "jsonl_output")]
      JsonLinesOutput::SCHEME => Ok(OutputWrapper::JsonLines(JsonLinesOutput::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, report: &FrameReport) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.render_result(report),
      #[cfg(feature = "jsonl_output")]
      OutputWrapper::JsonLines(output) => output.render_result(report),
    }
  }
}
