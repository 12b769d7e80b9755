// 该文件是 Xifeng （西风） 项目的一部分。
// src/output/record.rs - 检测结果文本/JSON 记录
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

use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;

use crate::model::DetectResult;

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  /// 每行 `类别, 分数, x1, y1, x2, y2`，类别写名称
  TextWithName,
  /// 同上，类别写编号
  TextWithId,
  Json,
}

/// 把检测结果按张量坐标写到图像旁边的记录文件
pub struct Record {
  pub format: RecordFormat,
}

impl Record {
  pub fn render(&self, result: &DetectResult) -> Result<String, RecordError> {
    match self.format {
      RecordFormat::TextWithName | RecordFormat::TextWithId => {
        let lines: Vec<String> = result
          .items
          .iter()
          .map(|item| {
            let name = if self.format == RecordFormat::TextWithName {
              item.class_name().to_string()
            } else {
              item.class_id().to_string()
            };
            let b = item.bbox();
            format!(
              "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
              name,
              item.score(),
              b.x1,
              b.y1,
              b.x2,
              b.y2
            )
          })
          .collect();
        Ok(lines.join("\n"))
      }
      RecordFormat::Json => {
        let value = json!({
          "tensor_size": [result.tensor_size.width, result.tensor_size.height],
          "detections": result.items,
        });
        Ok(serde_json::to_string_pretty(&value)?)
      }
    }
  }

  pub fn record_path(&self, path: &Path) -> PathBuf {
    match self.format {
      RecordFormat::Json => path.with_extension("json"),
      _ => path.with_extension("txt"),
    }
  }

  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<PathBuf, RecordError> {
    let target = self.record_path(path);
    std::fs::write(&target, self.render(result)?)?;
    Ok(target)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    codec::TargetSize,
    model::{BoundingBox, BoxUnits, Detection},
  };

  fn sample() -> DetectResult {
    DetectResult::new(
      vec![Detection::new(
        2,
        "car",
        0.75,
        BoundingBox::from_corners(1.0, 2.0, 3.0, 4.0),
        BoxUnits::TensorPixels,
      )],
      TargetSize::new(640, 640),
    )
  }

  #[test]
  fn text_records() {
    let by_name = Record {
      format: RecordFormat::TextWithName,
    };
    assert_eq!(
      by_name.render(&sample()).unwrap(),
      "car, 0.7500, 1.0000, 2.0000, 3.0000, 4.0000"
    );
    let by_id = Record {
      format: RecordFormat::TextWithId,
    };
    assert!(by_id.render(&sample()).unwrap().starts_with("2, 0.7500"));
  }

  #[test]
  fn json_record_lists_detections() {
    let record = Record {
      format: RecordFormat::Json,
    };
    let value: serde_json::Value = serde_json::from_str(&record.render(&sample()).unwrap()).unwrap();
    assert_eq!(value["tensor_size"], json!([640, 640]));
    assert_eq!(value["detections"][0]["class_name"], "car");
    assert_eq!(value["detections"][0]["units"], "tensor_pixels");
    assert_eq!(value["detections"][0]["bbox"]["x2"], 3.0);
  }

  #[test]
  fn writes_next_to_image() {
    let dir = tempfile::tempdir().unwrap();
    let record = Record {
      format: RecordFormat::Json,
    };
    let written = record
      .record(&sample(), &dir.path().join("frame.png"))
      .unwrap();
    assert_eq!(written, dir.path().join("frame.json"));
    assert!(written.exists());
  }
}
