// 该文件是 Yanqian （眼前） 项目的一部分。
// src/input/image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  frame::{Orientation, RawFrame},
  input::{InputError, orientation_param},
};

/// 把一张静态图像编码为 I420 帧后交付一次
pub struct ImageFileInput {
  frame: Option<RawFrame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let orientation = orientation_param(url)?;
    let path = decode_url_path(url);
    let image = ImageReader::open(&path)?.decode()?;
    info!(
      "加载图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Self::from_image(&image.into_rgb8(), orientation)
  }
}

impl ImageFileInput {
  pub fn from_image(image: &RgbImage, orientation: Orientation) -> Result<Self, InputError> {
    let frame = RawFrame::encode_i420(image)?.with_orientation(orientation);
    Ok(Self { frame: Some(frame) })
  }
}

impl Iterator for ImageFileInput {
  type Item = RawFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}
