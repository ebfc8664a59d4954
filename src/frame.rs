// 该文件是 Yanqian （眼前） 项目的一部分。
// src/frame.rs - 传感器原始帧定义与解码
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

use image::{RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

mod yuv;

pub use self::yuv::{rgb_to_ycbcr, ycbcr_to_rgb};

const RGB_CHANNELS: usize = 3;
const YUV_PLANES: usize = 3;

/// 打包的 RGB 光栅图像（HWC，每通道 8 位）
pub type RasterImage = RgbImage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("不支持的帧格式: {0}")]
  UnsupportedFormat(String),
  #[error("无效的帧: {0}")]
  InvalidFrame(String),
}

/// 传感器方向（顺时针）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
  #[default]
  Deg0,
  Deg90,
  Deg180,
  Deg270,
}

impl Orientation {
  pub fn from_degrees(degrees: u32) -> Result<Self, FrameError> {
    match degrees % 360 {
      0 => Ok(Orientation::Deg0),
      90 => Ok(Orientation::Deg90),
      180 => Ok(Orientation::Deg180),
      270 => Ok(Orientation::Deg270),
      other => Err(FrameError::UnsupportedFormat(format!(
        "传感器方向必须是 90 的整数倍, 实际为 {}",
        other
      ))),
    }
  }

  pub fn degrees(self) -> u32 {
    match self {
      Orientation::Deg0 => 0,
      Orientation::Deg90 => 90,
      Orientation::Deg180 => 180,
      Orientation::Deg270 => 270,
    }
  }

  /// 旋转后宽高是否互换
  pub fn swaps_axes(self) -> bool {
    matches!(self, Orientation::Deg90 | Orientation::Deg270)
  }
}

/// 色度下采样因子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaSubsampling {
  pub horizontal: u32,
  pub vertical: u32,
}

impl ChromaSubsampling {
  /// 4:2:0，每个色度样本覆盖 2×2 亮度块
  pub const YUV420: ChromaSubsampling = ChromaSubsampling {
    horizontal: 2,
    vertical: 2,
  };
}

/// 单个像素平面
#[derive(Debug, Clone)]
pub struct Plane {
  data: Box<[u8]>,
  row_stride: usize,
  pixel_stride: usize,
}

impl Plane {
  pub fn new(data: impl Into<Box<[u8]>>, row_stride: usize, pixel_stride: usize) -> Self {
    Self {
      data: data.into(),
      row_stride,
      pixel_stride,
    }
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn row_stride(&self) -> usize {
    self.row_stride
  }

  pub fn pixel_stride(&self) -> usize {
    self.pixel_stride
  }

  /// 检查平面能否容纳 `cols × rows` 个样本
  fn check_extent(&self, name: &str, cols: usize, rows: usize) -> Result<(), FrameError> {
    if self.data.is_empty() {
      return Err(FrameError::InvalidFrame(format!("{} 平面为空", name)));
    }
    if self.row_stride == 0 || self.pixel_stride == 0 {
      return Err(FrameError::InvalidFrame(format!(
        "{} 平面步长无效: 行步长 {}, 像素步长 {}",
        name, self.row_stride, self.pixel_stride
      )));
    }
    let last = (rows - 1)
      .checked_mul(self.row_stride)
      .zip((cols - 1).checked_mul(self.pixel_stride))
      .and_then(|(row, col)| row.checked_add(col))
      .ok_or_else(|| {
        FrameError::InvalidFrame(format!(
          "{} 平面步长溢出: 行步长 {}, 像素步长 {}",
          name, self.row_stride, self.pixel_stride
        ))
      })?;
    if last >= self.data.len() {
      return Err(FrameError::InvalidFrame(format!(
        "{} 平面长度不足: 需要 {} 字节, 实际 {} 字节",
        name,
        last + 1,
        self.data.len()
      )));
    }
    Ok(())
  }
}

/// 相机送来的原始帧
///
/// 帧创建后不可修改，由接收它的那次流水线调用独占，解码后即被丢弃。
#[derive(Debug, Clone)]
pub struct RawFrame {
  width: u32,
  height: u32,
  orientation: Orientation,
  subsampling: ChromaSubsampling,
  planes: Vec<Plane>,
}

impl RawFrame {
  pub fn new(width: u32, height: u32, subsampling: ChromaSubsampling, planes: Vec<Plane>) -> Self {
    Self {
      width,
      height,
      orientation: Orientation::Deg0,
      subsampling,
      planes,
    }
  }

  pub fn with_orientation(mut self, orientation: Orientation) -> Self {
    self.orientation = orientation;
    self
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn orientation(&self) -> Orientation {
    self.orientation
  }

  pub fn subsampling(&self) -> ChromaSubsampling {
    self.subsampling
  }

  pub fn planes(&self) -> &[Plane] {
    &self.planes
  }
}

/// 将平面 YUV 4:2:0 帧转换为 RGB 光栅
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl FrameDecoder {
  pub fn decode(&self, frame: &RawFrame) -> Result<RasterImage, FrameError> {
    if frame.planes.len() != YUV_PLANES {
      return Err(FrameError::UnsupportedFormat(format!(
        "期望 {} 个平面, 实际为 {}",
        YUV_PLANES,
        frame.planes.len()
      )));
    }
    if frame.subsampling != ChromaSubsampling::YUV420 {
      return Err(FrameError::UnsupportedFormat(format!(
        "仅支持 2×2 色度下采样, 实际为 {}×{}",
        frame.subsampling.horizontal, frame.subsampling.vertical
      )));
    }
    if frame.width == 0 || frame.height == 0 {
      return Err(FrameError::InvalidFrame(format!(
        "帧尺寸为零: {}x{}",
        frame.width, frame.height
      )));
    }

    let width = frame.width as usize;
    let height = frame.height as usize;
    let (luma, cb, cr) = (&frame.planes[0], &frame.planes[1], &frame.planes[2]);
    let chroma_cols = width.div_ceil(2);
    let chroma_rows = height.div_ceil(2);
    luma.check_extent("Y", width, height)?;
    cb.check_extent("U", chroma_cols, chroma_rows)?;
    cr.check_extent("V", chroma_cols, chroma_rows)?;

    let mut raster = RasterImage::new(frame.width, frame.height);
    for (y, row) in raster.chunks_exact_mut(width * RGB_CHANNELS).enumerate() {
      let luma_row = y * luma.row_stride;
      let cb_row = (y / 2) * cb.row_stride;
      let cr_row = (y / 2) * cr.row_stride;
      for (x, pixel) in row.chunks_exact_mut(RGB_CHANNELS).enumerate() {
        let l = luma.data[luma_row + x * luma.pixel_stride];
        let u = cb.data[cb_row + (x / 2) * cb.pixel_stride];
        let v = cr.data[cr_row + (x / 2) * cr.pixel_stride];
        pixel.copy_from_slice(&ycbcr_to_rgb(l, u, v));
      }
    }

    debug!(
      "帧解码完成: {}x{}, 旋转 {}°",
      frame.width,
      frame.height,
      frame.orientation.degrees()
    );

    Ok(rotate(raster, frame.orientation))
  }
}

fn rotate(raster: RasterImage, orientation: Orientation) -> RasterImage {
  match orientation {
    Orientation::Deg0 => raster,
    Orientation::Deg90 => imageops::rotate90(&raster),
    Orientation::Deg180 => imageops::rotate180(&raster),
    Orientation::Deg270 => imageops::rotate270(&raster),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn uniform_i420(width: u32, height: u32, luma: u8, chroma: (u8, u8)) -> RawFrame {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    RawFrame::new(
      width,
      height,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(vec![luma; w * h], w, 1),
        Plane::new(vec![chroma.0; cw * ch], cw, 1),
        Plane::new(vec![chroma.1; cw * ch], cw, 1),
      ],
    )
  }

  #[test]
  fn neutral_chroma_yields_gray() {
    for luma in [0u8, 17, 128, 200, 255] {
      let raster = FrameDecoder.decode(&uniform_i420(6, 4, luma, (128, 128))).unwrap();
      assert_eq!(raster.dimensions(), (6, 4));
      assert!(raster.pixels().all(|p| p.0 == [luma, luma, luma]));
    }
  }

  #[test]
  fn saturated_chroma_is_clamped() {
    let raster = FrameDecoder.decode(&uniform_i420(2, 2, 255, (255, 255))).unwrap();
    let p = raster.get_pixel(0, 0).0;
    assert_eq!(p[0], 255);
    assert_eq!(p[2], 255);
    let raster = FrameDecoder.decode(&uniform_i420(2, 2, 0, (0, 0))).unwrap();
    assert_eq!(raster.get_pixel(1, 1).0, [0, 135, 0]);
  }

  #[test]
  fn chroma_sample_covers_two_by_two_block() {
    // 4x2 帧，两个色度样本：左侧偏红，右侧中性
    let frame = RawFrame::new(
      4,
      2,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(vec![100; 8], 4, 1),
        Plane::new(vec![128, 128], 2, 1),
        Plane::new(vec![200, 128], 2, 1),
      ],
    );
    let raster = FrameDecoder.decode(&frame).unwrap();
    for y in 0..2 {
      assert_eq!(raster.get_pixel(0, y), raster.get_pixel(1, y));
      assert!(raster.get_pixel(0, y).0[0] > 100);
      assert_eq!(raster.get_pixel(2, y).0, [100, 100, 100]);
      assert_eq!(raster.get_pixel(3, y).0, [100, 100, 100]);
    }
  }

  #[test]
  fn honors_row_and_pixel_strides() {
    // 2x2 帧，亮度行步长 3（含填充），色度交错存放（像素步长 2）
    let frame = RawFrame::new(
      2,
      2,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(vec![10, 20, 0, 30, 40, 0], 3, 1),
        Plane::new(vec![128, 99], 4, 2),
        Plane::new(vec![128, 99], 4, 2),
      ],
    );
    let raster = FrameDecoder.decode(&frame).unwrap();
    assert_eq!(raster.get_pixel(0, 0).0, [10, 10, 10]);
    assert_eq!(raster.get_pixel(1, 0).0, [20, 20, 20]);
    assert_eq!(raster.get_pixel(0, 1).0, [30, 30, 30]);
    assert_eq!(raster.get_pixel(1, 1).0, [40, 40, 40]);
  }

  #[test]
  fn rotation_swaps_dimensions() {
    let mut frame = uniform_i420(4, 2, 50, (128, 128));
    // 左上角亮度标记
    if let Some(plane) = frame.planes.first_mut() {
      let mut data = plane.data.to_vec();
      data[0] = 250;
      plane.data = data.into_boxed_slice();
    }
    let raster = FrameDecoder
      .decode(&frame.clone().with_orientation(Orientation::Deg90))
      .unwrap();
    assert_eq!(raster.dimensions(), (2, 4));
    // 顺时针 90°：原左上角移到右上角
    assert_eq!(raster.get_pixel(1, 0).0, [250, 250, 250]);

    let raster = FrameDecoder
      .decode(&frame.clone().with_orientation(Orientation::Deg180))
      .unwrap();
    assert_eq!(raster.dimensions(), (4, 2));
    assert_eq!(raster.get_pixel(3, 1).0, [250, 250, 250]);

    let raster = FrameDecoder
      .decode(&frame.with_orientation(Orientation::Deg270))
      .unwrap();
    assert_eq!(raster.dimensions(), (2, 4));
    assert_eq!(raster.get_pixel(0, 3).0, [250, 250, 250]);
  }

  #[test]
  fn rejects_wrong_plane_count() {
    let frame = RawFrame::new(
      2,
      2,
      ChromaSubsampling::YUV420,
      vec![Plane::new(vec![0; 4], 2, 1)],
    );
    assert!(matches!(
      FrameDecoder.decode(&frame),
      Err(FrameError::UnsupportedFormat(_))
    ));
  }

  #[test]
  fn rejects_other_subsampling() {
    let frame = uniform_i420(2, 2, 0, (128, 128));
    let frame = RawFrame::new(
      2,
      2,
      ChromaSubsampling {
        horizontal: 2,
        vertical: 1,
      },
      frame.planes,
    );
    assert!(matches!(
      FrameDecoder.decode(&frame),
      Err(FrameError::UnsupportedFormat(_))
    ));
  }

  #[test]
  fn rejects_empty_and_short_planes() {
    let zero = uniform_i420(0, 2, 0, (128, 128));
    assert!(matches!(
      FrameDecoder.decode(&zero),
      Err(FrameError::InvalidFrame(_))
    ));

    let short = RawFrame::new(
      4,
      4,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(vec![0; 15], 4, 1),
        Plane::new(vec![128; 4], 2, 1),
        Plane::new(vec![128; 4], 2, 1),
      ],
    );
    assert!(matches!(
      FrameDecoder.decode(&short),
      Err(FrameError::InvalidFrame(_))
    ));

    let empty = RawFrame::new(
      2,
      2,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(vec![0; 4], 2, 1),
        Plane::new(Vec::new(), 1, 1),
        Plane::new(vec![128], 1, 1),
      ],
    );
    assert!(matches!(
      FrameDecoder.decode(&empty),
      Err(FrameError::InvalidFrame(_))
    ));
  }

  #[test]
  fn overflowing_strides_are_rejected() {
    let frame = RawFrame::new(
      2,
      2,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(vec![0; 4], usize::MAX, 1),
        Plane::new(vec![128], 1, 1),
        Plane::new(vec![128], 1, 1),
      ],
    );
    assert!(matches!(
      FrameDecoder.decode(&frame),
      Err(FrameError::InvalidFrame(_))
    ));

    let frame = RawFrame::new(
      6,
      2,
      ChromaSubsampling::YUV420,
      vec![
        Plane::new(vec![0; 12], 6, 1),
        Plane::new(vec![128; 3], 3, usize::MAX / 2 + 1),
        Plane::new(vec![128; 3], 3, 1),
      ],
    );
    assert!(matches!(
      FrameDecoder.decode(&frame),
      Err(FrameError::InvalidFrame(_))
    ));
  }

  #[test]
  fn orientation_parsing() {
    assert_eq!(Orientation::from_degrees(270).unwrap(), Orientation::Deg270);
    assert_eq!(Orientation::from_degrees(360).unwrap(), Orientation::Deg0);
    assert!(Orientation::from_degrees(45).is_err());
    assert!(Orientation::Deg90.swaps_axes());
    assert!(!Orientation::Deg180.swaps_axes());
  }
}
