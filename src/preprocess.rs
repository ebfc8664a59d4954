// 该文件是 Yanqian （眼前） 项目的一部分。
// src/preprocess.rs - 信箱缩放与归一化预处理
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

use image::imageops::{self, FilterType};
use tracing::debug;

use crate::{
  config::ChannelOrder,
  frame::{FrameError, RasterImage},
};

const RGB_CHANNELS: usize = 3;

/// 信箱变换参数，用于把模型坐标映射回原始光栅
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub source_width: u32,
  pub source_height: u32,
  pub target_size: u32,
}

impl LetterboxTransform {
  /// 原始光栅像素 → 模型输入像素
  pub fn to_model(&self, x: f32, y: f32) -> (f32, f32) {
    (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
  }

  /// 模型输入像素 → 原始光栅像素，结果截断到光栅范围内
  pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
    (
      ((x - self.pad_x) / self.scale).clamp(0.0, self.source_width as f32),
      ((y - self.pad_y) / self.scale).clamp(0.0, self.source_height as f32),
    )
  }
}

/// 固定尺寸 S×S×3 的模型输入（HWC，取值 [0, 1]）
#[derive(Debug, Clone)]
pub struct ModelInput {
  size: u32,
  data: Box<[f32]>,
}

impl ModelInput {
  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_hwc(&self) -> &[f32] {
    &self.data
  }

  /// 重新量化为 8 位 HWC，供输入张量为 uint8 的后端使用
  pub fn to_u8_hwc(&self) -> Vec<u8> {
    self
      .data
      .iter()
      .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
      .collect()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
  size: u32,
  channel_order: ChannelOrder,
}

impl Preprocessor {
  pub fn new(size: u32, channel_order: ChannelOrder) -> Self {
    Self {
      size,
      channel_order,
    }
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn preprocess(
    &self,
    raster: &RasterImage,
  ) -> Result<(ModelInput, LetterboxTransform), FrameError> {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidFrame(format!(
        "光栅尺寸为零: {}x{}",
        width, height
      )));
    }

    let size = self.size;
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let resized_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let resized_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - resized_w) / 2;
    let pad_y = (size - resized_h) / 2;

    debug!(
      "信箱缩放: {}x{} -> {}x{}, 比例 {:.4}, 填充 ({}, {})",
      width, height, resized_w, resized_h, scale, pad_x, pad_y
    );

    let resized;
    let source = if (resized_w, resized_h) == (width, height) {
      raster
    } else {
      resized = imageops::resize(raster, resized_w, resized_h, FilterType::Triangle);
      &resized
    };

    let side = size as usize;
    let mut data = vec![0f32; side * side * RGB_CHANNELS].into_boxed_slice();
    let row_len = resized_w as usize * RGB_CHANNELS;
    for (y, src_row) in source.chunks_exact(row_len).enumerate() {
      let dst_start = ((y + pad_y as usize) * side + pad_x as usize) * RGB_CHANNELS;
      let dst_row = &mut data[dst_start..dst_start + row_len];
      for (dst, src) in dst_row
        .chunks_exact_mut(RGB_CHANNELS)
        .zip(src_row.chunks_exact(RGB_CHANNELS))
      {
        let [r, g, b] = [src[0], src[1], src[2]].map(|c| c as f32 / 255.0);
        match self.channel_order {
          ChannelOrder::Rgb => dst.copy_from_slice(&[r, g, b]),
          ChannelOrder::Bgr => dst.copy_from_slice(&[b, g, r]),
        }
      }
    }

    let transform = LetterboxTransform {
      scale,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
      source_width: width,
      source_height: height,
      target_size: size,
    };

    Ok((ModelInput { size, data }, transform))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn pixel(input: &ModelInput, x: usize, y: usize) -> [f32; 3] {
    let side = input.size() as usize;
    let i = (y * side + x) * 3;
    let d = input.as_hwc();
    [d[i], d[i + 1], d[i + 2]]
  }

  #[test]
  fn wide_frame_is_padded_vertically() {
    let raster = RasterImage::from_pixel(640, 480, Rgb([255, 255, 255]));
    let (input, t) = Preprocessor::new(320, ChannelOrder::Rgb)
      .preprocess(&raster)
      .unwrap();
    assert_eq!(input.as_hwc().len(), 320 * 320 * 3);
    assert!((t.scale - 0.5).abs() < 1e-6);
    assert_eq!((t.pad_x, t.pad_y), (0.0, 40.0));
    assert_eq!(pixel(&input, 10, 39), [0.0; 3]);
    assert_eq!(pixel(&input, 10, 40), [1.0; 3]);
    assert_eq!(pixel(&input, 10, 279), [1.0; 3]);
    assert_eq!(pixel(&input, 10, 280), [0.0; 3]);
  }

  #[test]
  fn tall_frame_is_padded_horizontally() {
    let raster = RasterImage::from_pixel(100, 200, Rgb([0, 0, 0]));
    let (_, t) = Preprocessor::new(640, ChannelOrder::Rgb)
      .preprocess(&raster)
      .unwrap();
    assert!((t.scale - 3.2).abs() < 1e-6);
    assert_eq!((t.pad_x, t.pad_y), (160.0, 0.0));
    assert_eq!((t.source_width, t.source_height), (100, 200));
  }

  #[test]
  fn channel_order_is_respected() {
    let raster = RasterImage::from_pixel(4, 4, Rgb([255, 0, 51]));
    let (rgb, _) = Preprocessor::new(4, ChannelOrder::Rgb)
      .preprocess(&raster)
      .unwrap();
    let (bgr, _) = Preprocessor::new(4, ChannelOrder::Bgr)
      .preprocess(&raster)
      .unwrap();
    assert_eq!(pixel(&rgb, 1, 1), [1.0, 0.0, 0.2]);
    assert_eq!(pixel(&bgr, 1, 1), [0.2, 0.0, 1.0]);
  }

  #[test]
  fn values_stay_in_unit_range() {
    let raster = RasterImage::from_fn(37, 23, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, 255]));
    let (input, _) = Preprocessor::new(64, ChannelOrder::Rgb)
      .preprocess(&raster)
      .unwrap();
    assert!(input.as_hwc().iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(input.to_u8_hwc().len(), 64 * 64 * 3);
  }

  #[test]
  fn zero_sized_raster_is_invalid() {
    let raster = RasterImage::new(0, 10);
    assert!(matches!(
      Preprocessor::new(64, ChannelOrder::Rgb).preprocess(&raster),
      Err(FrameError::InvalidFrame(_))
    ));
  }

  #[test]
  fn transform_round_trips_points() {
    let raster = RasterImage::new(1280, 720);
    let (_, t) = Preprocessor::new(640, ChannelOrder::Rgb)
      .preprocess(&raster)
      .unwrap();
    for (x, y) in [(0.0, 0.0), (640.0, 360.0), (1279.0, 719.0), (13.5, 700.25)] {
      let (mx, my) = t.to_model(x, y);
      let (sx, sy) = t.to_source(mx, my);
      assert!((sx - x).abs() < 1e-3 && (sy - y).abs() < 1e-3);
    }
    // 落在填充区的点被截断到边界
    assert_eq!(t.to_source(10.0, 5.0).1, 0.0);
    assert_eq!(t.to_source(10.0, 639.0).1, 720.0);
  }
}
