// 该文件是 Yanqian （眼前） 项目的一部分。
// src/output/log.rs - 日志输出
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

use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Render},
  pipeline::FrameReport,
};

/// 每个检测一行日志
#[derive(Debug, Default)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(LogOutput)
  }
}

impl Render for LogOutput {
  type Error = OutputError;

  fn render_result(&self, report: &FrameReport) -> Result<(), Self::Error> {
    if let Some(diagnostic) = &report.diagnostic {
      warn!("第 {} 帧: {}", report.index, diagnostic);
      return Ok(());
    }

    info!(
      "第 {} 帧 ({}x{}): {} 个检测",
      report.index,
      report.width,
      report.height,
      report.detections.len()
    );
    for det in report.detections.iter() {
      let [l, t, r, b] = det.bbox;
      match det.distance.meters() {
        Some(m) => info!(
          "  {} ({}) {:.2} [{:.3}, {:.3}, {:.3}, {:.3}] 约 {:.1} 米",
          det.label, det.class_id, det.confidence, l, t, r, b, m
        ),
        None => info!(
          "  {} ({}) {:.2} [{:.3}, {:.3}, {:.3}, {:.3}] 距离未知",
          det.label, det.class_id, det.confidence, l, t, r, b
        ),
      }
    }
    Ok(())
  }
}
