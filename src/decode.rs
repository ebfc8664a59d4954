// 该文件是 Yanqian （眼前） 项目的一部分。
// src/decode.rs - 输出张量解码
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

use tracing::debug;

use crate::{
  config::{BoxEncoding, DEFAULT_CONFIDENCE_THRESHOLD},
  detection::Detection,
  model::{BOX_FIELDS, ClassTable, InferenceError, OutputTensor},
  preprocess::LetterboxTransform,
};

/// 把逐框输出解释为原始帧坐标下的候选检测
#[derive(Debug, Clone, Copy)]
pub struct DetectionDecoder {
  threshold: f32,
  encoding: BoxEncoding,
}

impl Default for DetectionDecoder {
  fn default() -> Self {
    Self::new(DEFAULT_CONFIDENCE_THRESHOLD, BoxEncoding::default())
  }
}

impl DetectionDecoder {
  pub fn new(threshold: f32, encoding: BoxEncoding) -> Self {
    Self {
      threshold,
      encoding,
    }
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  /// 输出顺序与张量行顺序一致
  pub fn decode(
    &self,
    tensor: &OutputTensor,
    transform: &LetterboxTransform,
    classes: &ClassTable,
  ) -> Result<Vec<Detection>, InferenceError> {
    let rows = tensor.rows()?;
    let size = transform.target_size as f32;
    let src_w = transform.source_width as f32;
    let src_h = transform.source_height as f32;

    let mut detections = Vec::new();
    for row in rows.iter() {
      let (geometry, scores) = row.split_at(BOX_FIELDS);
      let [cx, cy, w, h, objectness] = [
        geometry[0],
        geometry[1],
        geometry[2],
        geometry[3],
        geometry[4],
      ];

      // 取第一个最大值
      let (class_id, best_score) = scores.iter().enumerate().fold(
        (0usize, f32::NEG_INFINITY),
        |(best_id, best), (id, &score)| {
          if score > best {
            (id, score)
          } else {
            (best_id, best)
          }
        },
      );

      let confidence = objectness * best_score;
      if !confidence.is_finite() || confidence < self.threshold {
        continue;
      }
      if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
        continue;
      }

      let normalized = match self.encoding {
        BoxEncoding::Normalized => true,
        BoxEncoding::Pixels => false,
        BoxEncoding::Auto => cx <= 1.0 && cy <= 1.0 && w <= 1.0 && h <= 1.0,
      };
      let [cx, cy, w, h] = if normalized {
        [cx, cy, w, h].map(|v| v * size)
      } else {
        [cx, cy, w, h]
      };

      let (left, top) = transform.to_source(cx - w / 2.0, cy - h / 2.0);
      let (right, bottom) = transform.to_source(cx + w / 2.0, cy + h / 2.0);

      detections.push(Detection::new(
        class_id as u32,
        classes.label(class_id),
        confidence.clamp(0.0, 1.0),
        [left / src_w, top / src_h, right / src_w, bottom / src_h],
      ));
    }

    debug!(
      "解码 {} 行, 保留 {} 个候选 (阈值 {})",
      rows.num_boxes(),
      detections.len(),
      self.threshold
    );
    Ok(detections)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{TensorData, UNKNOWN_LABEL};

  fn identity(size: u32) -> LetterboxTransform {
    LetterboxTransform {
      scale: 1.0,
      pad_x: 0.0,
      pad_y: 0.0,
      source_width: size,
      source_height: size,
      target_size: size,
    }
  }

  fn tensor(rows: &[Vec<f32>]) -> OutputTensor {
    let vpb = rows[0].len();
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    OutputTensor::new(vec![1, rows.len(), vpb], TensorData::Float32(data.into())).unwrap()
  }

  fn row(geometry: [f32; 5], scores: &[f32]) -> Vec<f32> {
    let mut row = geometry.to_vec();
    row.extend_from_slice(scores);
    row
  }

  #[test]
  fn centered_person_is_decoded() {
    let mut scores = vec![0.0; 80];
    scores[0] = 0.8;
    scores[1] = 0.1;
    let t = tensor(&[row([320.0, 320.0, 100.0, 200.0, 0.9], &scores)]);
    let dets = DetectionDecoder::default()
      .decode(&t, &identity(640), &ClassTable::coco())
      .unwrap();
    assert_eq!(dets.len(), 1);
    let det = &dets[0];
    assert_eq!(det.class_id, 0);
    assert_eq!(det.label, "person");
    assert!((det.confidence - 0.72).abs() < 1e-5);
    let (cx, cy) = det.center();
    assert!((cx - 0.5).abs() < 1e-5 && (cy - 0.5).abs() < 1e-5);
    assert!((det.width() - 100.0 / 640.0).abs() < 1e-5);
    assert!((det.height() - 200.0 / 640.0).abs() < 1e-5);
  }

  #[test]
  fn low_objectness_yields_nothing() {
    let t = tensor(&[
      row([100.0, 100.0, 50.0, 50.0, 0.1], &[0.9, 0.1]),
      row([200.0, 200.0, 50.0, 50.0, 0.3], &[1.0, 0.1]),
    ]);
    let dets = DetectionDecoder::default()
      .decode(&t, &identity(640), &ClassTable::coco())
      .unwrap();
    assert!(dets.is_empty());
  }

  #[test]
  fn first_maximum_wins_and_unknown_label_is_used() {
    let t = tensor(&[row([10.0, 10.0, 4.0, 4.0, 1.0], &[0.2, 0.7, 0.7])]);
    let classes = ClassTable::new(["a"]);
    let dets = DetectionDecoder::default()
      .decode(&t, &identity(64), &classes)
      .unwrap();
    assert_eq!(dets[0].class_id, 1);
    assert_eq!(dets[0].label, UNKNOWN_LABEL);
  }

  #[test]
  fn normalized_boxes_are_scaled_by_input_size() {
    let t = tensor(&[row([0.5, 0.5, 0.25, 0.5, 1.0], &[0.0, 0.9])]);
    let dets = DetectionDecoder::new(0.5, BoxEncoding::Auto)
      .decode(&t, &identity(320), &ClassTable::coco())
      .unwrap();
    let bbox = dets[0].bbox;
    let expected = [0.375, 0.25, 0.625, 0.75];
    for (got, want) in bbox.iter().zip(expected) {
      assert!((got - want).abs() < 1e-5);
    }

    // 强制像素坐标时同样的数值只是一个亚像素框
    let dets = DetectionDecoder::new(0.5, BoxEncoding::Pixels)
      .decode(&t, &identity(320), &ClassTable::coco())
      .unwrap();
    assert!(dets[0].width() < 0.01);
  }

  #[test]
  fn letterbox_is_undone() {
    // 640x480 帧在 320 输入上: 比例 0.5, 上下各填充 40
    let transform = LetterboxTransform {
      scale: 0.5,
      pad_x: 0.0,
      pad_y: 40.0,
      source_width: 640,
      source_height: 480,
      target_size: 320,
    };
    let t = tensor(&[row([160.0, 160.0, 64.0, 48.0, 1.0], &[1.0])]);
    let dets = DetectionDecoder::default()
      .decode(&t, &transform, &ClassTable::coco())
      .unwrap();
    let [l, top, r, b] = dets[0].bbox;
    assert!((l * 640.0 - 256.0).abs() < 1e-3);
    assert!((r * 640.0 - 384.0).abs() < 1e-3);
    assert!((top * 480.0 - 192.0).abs() < 1e-3);
    assert!((b * 480.0 - 288.0).abs() < 1e-3);
  }

  #[test]
  fn boxes_are_clamped_and_non_finite_rows_skipped() {
    let t = tensor(&[
      row([0.0, 0.0, 100.0, 100.0, 1.0], &[1.0]),
      row([f32::NAN, 10.0, 10.0, 10.0, 1.0], &[1.0]),
      row([10.0, 10.0, 10.0, 10.0, f32::INFINITY], &[1.0]),
    ]);
    let dets = DetectionDecoder::default()
      .decode(&t, &identity(200), &ClassTable::coco())
      .unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].bbox[0], 0.0);
    assert_eq!(dets[0].bbox[1], 0.0);
  }

  #[test]
  fn confidence_is_clamped_to_unit_range() {
    let t = tensor(&[row([10.0, 10.0, 4.0, 4.0, 2.0], &[0.9])]);
    let dets = DetectionDecoder::default()
      .decode(&t, &identity(64), &ClassTable::coco())
      .unwrap();
    assert_eq!(dets[0].confidence, 1.0);
  }

  #[test]
  fn integer_tensors_are_widened() {
    let data = vec![32, 32, 10, 10, 1, 0, 1];
    let t = OutputTensor::new(vec![1, 7], TensorData::Int32(data.into())).unwrap();
    let dets = DetectionDecoder::default()
      .decode(&t, &identity(64), &ClassTable::coco())
      .unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].label, "bicycle");
  }

  #[test]
  fn bad_shape_is_an_error() {
    let t = OutputTensor::new(vec![2, 1, 6], TensorData::Float32(vec![0.0; 12].into())).unwrap();
    assert!(
      DetectionDecoder::default()
        .decode(&t, &identity(64), &ClassTable::coco())
        .is_err()
    );
  }
}
