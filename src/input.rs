// 该文件是 Yanqian （眼前） 项目的一部分。
// src/input.rs - 帧输入源
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

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameError, Orientation, RawFrame},
};

mod yuv_file;
pub use self::yuv_file::{YuvFileInput, YuvLayout};

#[cfg(feature = "read_image_file")]
mod image_file;
#[cfg(feature = "read_image_file")]
pub use self::image_file::ImageFileInput;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("输入读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("输入帧错误: {0}")]
  Frame(#[from] FrameError),
  #[cfg(feature = "read_image_file")]
  #[error("图像加载错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("输入参数无效: {0}")]
  InvalidParameter(String),
  #[error("输入 URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 读取 URL 查询参数并解析，缺省时返回 `None`
pub(crate) fn query_param<T: std::str::FromStr>(
  url: &Url,
  name: &str,
) -> Result<Option<T>, InputError> {
  match url.query_pairs().find(|(k, _)| k == name) {
    Some((_, value)) => value
      .parse()
      .map(Some)
      .map_err(|_| InputError::InvalidParameter(format!("{}={}", name, value))),
    None => Ok(None),
  }
}

pub(crate) fn orientation_param(url: &Url) -> Result<Orientation, InputError> {
  match query_param::<u32>(url, "rotate")? {
    Some(degrees) => Ok(Orientation::from_degrees(degrees)?),
    None => Ok(Orientation::default()),
  }
}

pub enum InputWrapper {
  YuvFile(YuvFileInput),
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      YuvFileInput::SCHEME => Ok(InputWrapper::YuvFile(YuvFileInput::from_url(url)?)),
      #[cfg(feature = "read_image_file")]
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = RawFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::YuvFile(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn query_params_are_parsed() {
    let url = Url::parse("yuv:///tmp/a.yuv?width=64&rotate=90&fps=abc").unwrap();
    assert_eq!(query_param::<u32>(&url, "width").unwrap(), Some(64));
    assert_eq!(query_param::<u32>(&url, "height").unwrap(), None);
    assert!(query_param::<f32>(&url, "fps").is_err());
    assert_eq!(orientation_param(&url).unwrap(), Orientation::Deg90);
  }

  #[test]
  fn bad_rotation_is_rejected() {
    let url = Url::parse("yuv:///tmp/a.yuv?rotate=45").unwrap();
    assert!(matches!(
      orientation_param(&url),
      Err(InputError::Frame(FrameError::UnsupportedFormat(_)))
    ));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("v4l2:///dev/video0").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }
}
