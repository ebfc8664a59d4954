// 该文件是 Yanqian （眼前） 项目的一部分。
// src/frame/yuv.rs - YCbCr 色彩空间转换与 YUV 4:2:0 帧打包
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

//! 全范围 BT.601（JFIF）系数。

use image::RgbImage;

use super::{ChromaSubsampling, FrameError, Plane, RawFrame};

const CHROMA_OFFSET: f32 = 128.0;

#[inline]
fn clamp_u8(value: f32) -> u8 {
  value.round().clamp(0.0, 255.0) as u8
}

/// 单个像素 YCbCr → RGB
#[inline]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
  let y = y as f32;
  let cb = cb as f32 - CHROMA_OFFSET;
  let cr = cr as f32 - CHROMA_OFFSET;
  [
    clamp_u8(y + 1.402 * cr),
    clamp_u8(y - 0.344_136 * cb - 0.714_136 * cr),
    clamp_u8(y + 1.772 * cb),
  ]
}

/// 单个像素 RGB → YCbCr
#[inline]
pub fn rgb_to_ycbcr(rgb: [u8; 3]) -> [u8; 3] {
  let [r, g, b] = rgb.map(|c| c as f32);
  [
    clamp_u8(0.299 * r + 0.587 * g + 0.114 * b),
    clamp_u8(CHROMA_OFFSET - 0.168_736 * r - 0.331_264 * g + 0.5 * b),
    clamp_u8(CHROMA_OFFSET + 0.5 * r - 0.418_688 * g - 0.081_312 * b),
  ]
}

fn frame_geometry(width: u32, height: u32) -> Result<(usize, usize, usize, usize), FrameError> {
  if width == 0 || height == 0 {
    return Err(FrameError::InvalidFrame(format!(
      "帧尺寸为零: {}x{}",
      width, height
    )));
  }
  let (w, h) = (width as usize, height as usize);
  Ok((w, h, w.div_ceil(2), h.div_ceil(2)))
}

fn check_len(data: &[u8], expected: usize) -> Result<(), FrameError> {
  if data.len() < expected {
    return Err(FrameError::InvalidFrame(format!(
      "缓冲区长度不足: 期望 {} 字节, 实际 {} 字节",
      expected,
      data.len()
    )));
  }
  Ok(())
}

impl RawFrame {
  /// 每帧字节数（I420 / NV12 / NV21 相同）
  pub fn yuv420_frame_len(width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    w * h + 2 * w.div_ceil(2) * h.div_ceil(2)
  }

  /// 三平面 I420：Y、U、V 依次紧密排列
  pub fn from_i420(width: u32, height: u32, data: &[u8]) -> Result<Self, FrameError> {
    let (w, h, cw, ch) = frame_geometry(width, height)?;
    check_len(data, Self::yuv420_frame_len(width, height))?;
    let (luma, rest) = data.split_at(w * h);
    let (cb, rest) = rest.split_at(cw * ch);
    let cr = &rest[..cw * ch];
    Ok(RawFrame::new(
      width,
      height,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(luma, w, 1),
        Plane::new(cb, cw, 1),
        Plane::new(cr, cw, 1),
      ],
    ))
  }

  /// 半平面 NV12：Y 后跟 UV 交错
  pub fn from_nv12(width: u32, height: u32, data: &[u8]) -> Result<Self, FrameError> {
    Self::from_semi_planar(width, height, data, false)
  }

  /// 半平面 NV21：Y 后跟 VU 交错（Android 相机默认格式）
  pub fn from_nv21(width: u32, height: u32, data: &[u8]) -> Result<Self, FrameError> {
    Self::from_semi_planar(width, height, data, true)
  }

  fn from_semi_planar(
    width: u32,
    height: u32,
    data: &[u8],
    v_first: bool,
  ) -> Result<Self, FrameError> {
    let (w, h, cw, ch) = frame_geometry(width, height)?;
    check_len(data, Self::yuv420_frame_len(width, height))?;
    let (luma, chroma) = data.split_at(w * h);
    let chroma = &chroma[..2 * cw * ch];
    // 交错平面按像素步长 2 暴露为两个独立平面
    let (first, second) = (&chroma[..], &chroma[1..]);
    let (cb, cr) = if v_first {
      (second, first)
    } else {
      (first, second)
    };
    Ok(RawFrame::new(
      width,
      height,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(luma, w, 1),
        Plane::new(cb, 2 * cw, 2),
        Plane::new(cr, 2 * cw, 2),
      ],
    ))
  }

  /// 将 RGB 图像编码为 I420 帧，色度取 2×2 块平均
  pub fn encode_i420(image: &RgbImage) -> Result<Self, FrameError> {
    let (width, height) = image.dimensions();
    let (w, h, cw, ch) = frame_geometry(width, height)?;

    let mut luma = vec![0u8; w * h];
    let mut cb = vec![0u8; cw * ch];
    let mut cr = vec![0u8; cw * ch];
    let mut cb_sum = vec![0u32; cw * ch];
    let mut cr_sum = vec![0u32; cw * ch];
    let mut count = vec![0u32; cw * ch];

    for (x, y, pixel) in image.enumerate_pixels() {
      let [l, u, v] = rgb_to_ycbcr(pixel.0);
      let (x, y) = (x as usize, y as usize);
      luma[y * w + x] = l;
      let c = (y / 2) * cw + x / 2;
      cb_sum[c] += u as u32;
      cr_sum[c] += v as u32;
      count[c] += 1;
    }
    for c in 0..cw * ch {
      let n = count[c].max(1);
      cb[c] = ((cb_sum[c] + n / 2) / n) as u8;
      cr[c] = ((cr_sum[c] + n / 2) / n) as u8;
    }

    Ok(RawFrame::new(
      width,
      height,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(luma, w, 1),
        Plane::new(cb, cw, 1),
        Plane::new(cr, cw, 1),
      ],
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::FrameDecoder;

  #[test]
  fn primaries_convert_back_within_tolerance() {
    for rgb in [[255, 0, 0], [0, 255, 0], [0, 0, 255], [90, 160, 30], [255, 255, 255]] {
      let [y, cb, cr] = rgb_to_ycbcr(rgb);
      let back = ycbcr_to_rgb(y, cb, cr);
      for c in 0..3 {
        assert!(
          (back[c] as i32 - rgb[c] as i32).abs() <= 2,
          "{:?} -> {:?}",
          rgb,
          back
        );
      }
    }
  }

  #[test]
  fn gray_encodes_to_neutral_chroma() {
    assert_eq!(rgb_to_ycbcr([77, 77, 77]), [77, 128, 128]);
  }

  #[test]
  fn nv21_and_i420_decode_identically() {
    // 2x2 帧，U=90，V=170
    let i420 = [10, 20, 30, 40, 90, 170];
    let nv21 = [10, 20, 30, 40, 170, 90];
    let nv12 = [10, 20, 30, 40, 90, 170];
    let a = FrameDecoder
      .decode(&RawFrame::from_i420(2, 2, &i420).unwrap())
      .unwrap();
    let b = FrameDecoder
      .decode(&RawFrame::from_nv21(2, 2, &nv21).unwrap())
      .unwrap();
    let c = FrameDecoder
      .decode(&RawFrame::from_nv12(2, 2, &nv12).unwrap())
      .unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
  }

  #[test]
  fn odd_dimensions_round_chroma_up() {
    assert_eq!(RawFrame::yuv420_frame_len(3, 3), 9 + 2 * 4);
    let data = vec![128u8; RawFrame::yuv420_frame_len(3, 3)];
    let raster = FrameDecoder
      .decode(&RawFrame::from_i420(3, 3, &data).unwrap())
      .unwrap();
    assert_eq!(raster.dimensions(), (3, 3));
  }

  #[test]
  fn short_buffer_is_invalid() {
    assert!(matches!(
      RawFrame::from_i420(4, 4, &[0; 10]),
      Err(FrameError::InvalidFrame(_))
    ));
  }

  #[test]
  fn encode_then_decode_keeps_flat_color() {
    let image = RgbImage::from_pixel(5, 3, image::Rgb([120, 60, 200]));
    let frame = RawFrame::encode_i420(&image).unwrap();
    let raster = FrameDecoder.decode(&frame).unwrap();
    for pixel in raster.pixels() {
      for c in 0..3 {
        assert!((pixel.0[c] as i32 - image.get_pixel(0, 0).0[c] as i32).abs() <= 2);
      }
    }
  }
}
