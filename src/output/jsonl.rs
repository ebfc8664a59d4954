// 该文件是 Yanqian （眼前） 项目的一部分。
// src/output/jsonl.rs - JSON Lines 文件输出
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
  io::{BufWriter, Write},
  sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  detection::Detection,
  output::{OutputError, Render},
  pipeline::FrameReport,
};

/// 每帧一行 JSON
///
/// `jsonl://<path>`，加上 `?skip_empty` 时不记录没有检测的帧。
pub struct JsonLinesOutput {
  writer: Mutex<BufWriter<File>>,
  skip_empty: bool,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = decode_url_path(url);
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    info!("检测结果写入 {}", path.display());

    Ok(JsonLinesOutput {
      writer: Mutex::new(BufWriter::new(File::create(&path)?)),
      skip_empty: url.query_pairs().any(|(k, _)| k == "skip_empty"),
    })
  }
}

fn detection_json(det: &Detection) -> Value {
  json!({
    "class_id": det.class_id,
    "label": det.label,
    "confidence": det.confidence,
    "bbox": det.bbox,
    "approx_distance_m": det.distance.meters(),
  })
}

fn report_json(report: &FrameReport) -> Value {
  let timings = report.timings.map(|t| {
    json!({
      "decode_ms": t.decode.as_secs_f64() * 1e3,
      "preprocess_ms": t.preprocess.as_secs_f64() * 1e3,
      "inference_ms": t.inference.as_secs_f64() * 1e3,
      "postprocess_ms": t.postprocess.as_secs_f64() * 1e3,
    })
  });
  json!({
    "timestamp": Utc::now().to_rfc3339(),
    "frame": report.index,
    "width": report.width,
    "height": report.height,
    "detections": report.detections.iter().map(detection_json).collect::<Vec<_>>(),
    "timings": timings,
    "error": report.diagnostic,
  })
}

impl JsonLinesOutput {
  fn writer(&self) -> MutexGuard<'_, BufWriter<File>> {
    self
      .writer
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl Render for JsonLinesOutput {
  type Error = OutputError;

  fn render_result(&self, report: &FrameReport) -> Result<(), Self::Error> {
    if self.skip_empty && report.detections.is_empty() && report.diagnostic.is_none() {
      return Ok(());
    }
    let mut writer = self.writer();
    serde_json::to_writer(&mut *writer, &report_json(report))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::DistanceEstimate;
  use std::sync::Arc;

  fn report(index: u64, detections: Vec<Detection>) -> FrameReport {
    FrameReport {
      index,
      width: 640,
      height: 480,
      detections: Arc::from(detections),
      timings: None,
      diagnostic: None,
    }
  }

  #[test]
  fn writes_one_line_per_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/results.jsonl");
    let url = Url::parse(&format!("jsonl://{}", path.display())).unwrap();
    let output = JsonLinesOutput::from_url(&url).unwrap();

    let near = Detection::new(0, "person", 0.72, [0.4, 0.3, 0.6, 0.7])
      .with_distance(DistanceEstimate::Meters(4.25));
    let far = Detection::new(2, "car", 0.5, [0.0, 0.0, 0.1, 0.1]);
    output.render_result(&report(0, vec![near, far])).unwrap();
    output.render_result(&report(1, Vec::new())).unwrap();
    output
      .render_result(&FrameReport::failed(2, "无效帧"))
      .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<Value> = text
      .lines()
      .map(|l| serde_json::from_str(l).unwrap())
      .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["frame"], 0);
    assert_eq!(lines[0]["detections"][0]["label"], "person");
    assert_eq!(lines[0]["detections"][0]["approx_distance_m"], 4.25);
    assert!(lines[0]["detections"][1]["approx_distance_m"].is_null());
    assert!(lines[0]["timestamp"].as_str().is_some());
    assert_eq!(lines[2]["error"], "无效帧");
  }

  #[test]
  fn skip_empty_drops_frames_without_detections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.jsonl");
    let url = Url::parse(&format!("jsonl://{}?skip_empty", path.display())).unwrap();
    let output = JsonLinesOutput::from_url(&url).unwrap();
    output.render_result(&report(0, Vec::new())).unwrap();
    output
      .render_result(&report(
        1,
        vec![Detection::new(0, "person", 0.9, [0.0, 0.0, 1.0, 1.0])],
      ))
      .unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 1);
  }
}
