// 该文件是 Yanqian （眼前） 项目的一部分。
// src/model/labels.rs - 类别表
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

use std::{path::Path, sync::Arc};

use tracing::info;

use super::InferenceError;

/// 类别索引越界时使用的占位标签
pub const UNKNOWN_LABEL: &str = "unknown";

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 按模型类别分数位置索引的只读类别表，加载一次后在所有帧间共享
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
  names: Arc<[String]>,
}

impl Default for ClassTable {
  fn default() -> Self {
    Self::coco()
  }
}

impl ClassTable {
  pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
    Self {
      names: names.into_iter().map(Into::<String>::into).collect(),
    }
  }

  pub fn coco() -> Self {
    Self::new(COCO_CLASSES)
  }

  /// 解析标签文本：每行一个标签，忽略空行与 `#` 注释
  pub fn parse(text: &str) -> Self {
    Self::new(
      text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let table = Self::parse(&text);
    if table.is_empty() {
      return Err(InferenceError::InvalidModelFile(format!(
        "标签文件为空: {}",
        path.display()
      )));
    }
    info!("从 {} 加载 {} 个类别", path.display(), table.len());
    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn label(&self, index: usize) -> &str {
    self
      .names
      .get(index)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_table_has_eighty_classes() {
    let table = ClassTable::coco();
    assert_eq!(table.len(), 80);
    assert_eq!(table.label(0), "person");
    assert_eq!(table.label(79), "toothbrush");
  }

  #[test]
  fn out_of_range_index_uses_placeholder() {
    let table = ClassTable::new(["door", "stairs"]);
    assert_eq!(table.label(1), "stairs");
    assert_eq!(table.label(2), UNKNOWN_LABEL);
  }

  #[test]
  fn parses_label_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "# 室内\nperson\n\n  chair  \ndoor\n").unwrap();
    let table = ClassTable::from_file(&path).unwrap();
    assert_eq!(table, ClassTable::new(["person", "chair", "door"]));

    let empty = dir.path().join("empty.txt");
    std::fs::write(&empty, "# nothing\n").unwrap();
    assert!(ClassTable::from_file(&empty).is_err());
  }
}
