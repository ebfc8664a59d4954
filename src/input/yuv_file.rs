// 该文件是 Yanqian （眼前） 项目的一部分。
// src/input/yuv_file.rs - 原始 YUV 帧文件输入
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

use std::{
  fs::File,
  io::{BufReader, ErrorKind, Read},
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  frame::{Orientation, RawFrame},
  input::{InputError, orientation_param, query_param},
};

/// 帧内平面排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YuvLayout {
  #[default]
  I420,
  Nv12,
  Nv21,
}

impl std::str::FromStr for YuvLayout {
  type Err = InputError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "i420" => Ok(YuvLayout::I420),
      "nv12" => Ok(YuvLayout::Nv12),
      "nv21" => Ok(YuvLayout::Nv21),
      other => Err(InputError::InvalidParameter(format!(
        "未知的 YUV 格式: {}",
        other
      ))),
    }
  }
}

/// 从文件中逐帧读取连续存放的原始 YUV 4:2:0 帧
///
/// `yuv://<path>?width=W&height=H&format=i420|nv12|nv21&rotate=R&fps=F`，
/// 设置 `fps` 后按相机节奏交付帧。
pub struct YuvFileInput {
  reader: Box<dyn Read + Send>,
  width: u32,
  height: u32,
  layout: YuvLayout,
  orientation: Orientation,
  interval: Option<Duration>,
  last_delivery: Option<Instant>,
  buffer: Vec<u8>,
}

impl FromUrlWithScheme for YuvFileInput {
  const SCHEME: &'static str = "yuv";
}

impl FromUrl for YuvFileInput {
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

    let width = query_param::<u32>(url, "width")?
      .ok_or_else(|| InputError::InvalidParameter("缺少 width 参数".to_string()))?;
    let height = query_param::<u32>(url, "height")?
      .ok_or_else(|| InputError::InvalidParameter("缺少 height 参数".to_string()))?;
    let layout = query_param::<YuvLayout>(url, "format")?.unwrap_or_default();
    let orientation = orientation_param(url)?;
    let fps = query_param::<f32>(url, "fps")?;

    let path = decode_url_path(url);
    info!(
      "打开 YUV 文件 {}: {}x{} {:?}, 旋转 {}°",
      path.display(),
      width,
      height,
      layout,
      orientation.degrees()
    );
    let file = File::open(&path)?;

    Self::new(BufReader::new(file), width, height, layout)?
      .with_orientation(orientation)
      .with_fps(fps)
  }
}

impl YuvFileInput {
  pub fn new(
    reader: impl Read + Send + 'static,
    width: u32,
    height: u32,
    layout: YuvLayout,
  ) -> Result<Self, InputError> {
    if width == 0 || height == 0 {
      return Err(InputError::InvalidParameter(format!(
        "帧尺寸无效: {}x{}",
        width, height
      )));
    }
    Ok(Self {
      reader: Box::new(reader),
      width,
      height,
      layout,
      orientation: Orientation::default(),
      interval: None,
      last_delivery: None,
      buffer: vec![0; RawFrame::yuv420_frame_len(width, height)],
    })
  }

  pub fn with_orientation(mut self, orientation: Orientation) -> Self {
    self.orientation = orientation;
    self
  }

  pub fn with_fps(mut self, fps: Option<f32>) -> Result<Self, InputError> {
    self.interval = match fps {
      Some(fps) if fps.is_finite() && fps > 0.0 => Some(Duration::from_secs_f32(1.0 / fps)),
      Some(fps) => {
        return Err(InputError::InvalidParameter(format!("帧率无效: {}", fps)));
      }
      None => None,
    };
    Ok(self)
  }

  fn pace(&mut self) {
    if let (Some(interval), Some(last)) = (self.interval, self.last_delivery) {
      let elapsed = last.elapsed();
      if elapsed < interval {
        thread::sleep(interval - elapsed);
      }
    }
    self.last_delivery = Some(Instant::now());
  }
}

impl Iterator for YuvFileInput {
  type Item = RawFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if let Err(e) = self.reader.read_exact(&mut self.buffer) {
      match e.kind() {
        ErrorKind::UnexpectedEof => debug!("YUV 文件读取完毕"),
        _ => warn!("YUV 文件读取失败: {}", e),
      }
      return None;
    }

    let (width, height, data) = (self.width, self.height, &self.buffer);
    let frame = match self.layout {
      YuvLayout::I420 => RawFrame::from_i420(width, height, data),
      YuvLayout::Nv12 => RawFrame::from_nv12(width, height, data),
      YuvLayout::Nv21 => RawFrame::from_nv21(width, height, data),
    };
    match frame {
      Ok(frame) => {
        self.pace();
        Some(frame.with_orientation(self.orientation))
      }
      Err(e) => {
        warn!("YUV 帧构造失败: {}", e);
        None
      }
    }
  }
}
