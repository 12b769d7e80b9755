// 该文件是 Xifeng （西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{Datelike, Local};
use image::RgbaImage;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{
    Render,
    draw::{Draw, DrawError},
    record::{Record, RecordError, RecordFormat},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录错误: {0}")]
  RecordError(#[from] RecordError),
  #[error("绘制配置错误: {0}")]
  DrawError(#[from] DrawError),
}

/// 绘制后保存，或保存原图并在旁边写记录文件
pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record(Record),
}

impl DrawWrapper {
  pub fn save_result(
    &self,
    path: &Path,
    frame: &RgbaImage,
    result: &DetectResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        draw.draw_detection(frame, result).save(path)?;
      }
      DrawWrapper::Record(record) => {
        frame.save(path)?;
        record.record(result, path)?;
      }
    };

    Ok(())
  }

  /// `record` 缺省时绘制检测框，`font` 只在绘制时生效
  pub fn with(kind: Option<&str>, font: Option<&str>) -> Result<Self, DrawError> {
    let format = match kind {
      None => return Ok(DrawWrapper::Draw(Box::new(Draw::from_font_query(font)?))),
      Some("id") => RecordFormat::TextWithId,
      Some("json") => RecordFormat::Json,
      Some(_) => RecordFormat::TextWithName,
    };
    Ok(DrawWrapper::Record(Record { format }))
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let query = |key: &str| {
      uri
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
    };
    let kind = query("record");
    let font = query("font");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: DrawWrapper::with(kind.as_deref(), font.as_deref())?,
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  /// `<目录>/<年>/<月>/<日>/<时-分-秒>-<序号>.png`
  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbaImage, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbaImage, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }
    let path = self.frame_path()?;
    debug!("记录帧: {}", path.display());
    self.draw.save_result(&path, frame, result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    codec::TargetSize,
    model::{BoundingBox, BoxUnits, Detection},
  };
  use image::Rgba;

  fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        found.extend(files_under(&path));
      } else {
        found.push(path);
      }
    }
    found.sort();
    found
  }

  fn output(dir: &Path, query: &str) -> DirectoryRecordOutput {
    let url = url::Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  #[test]
  fn empty_results_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
    let empty = DetectResult::new(Vec::new(), TargetSize::new(4, 4));

    output(dir.path(), "").render_result(&frame, &empty).unwrap();
    assert!(files_under(dir.path()).is_empty());

    output(dir.path(), "?always")
      .render_result(&frame, &empty)
      .unwrap();
    let files = files_under(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].to_string_lossy().ends_with("-0001.png"));
  }

  #[test]
  fn font_query_selects_label_font() {
    let dir = tempfile::tempdir().unwrap();
    let plain = output(dir.path(), "?font=none");
    assert!(matches!(&plain.draw, DrawWrapper::Draw(draw) if !draw.has_font()));

    let labelled = output(dir.path(), "");
    assert!(matches!(&labelled.draw, DrawWrapper::Draw(draw) if draw.has_font()));

    let url = url::Url::parse(&format!(
      "folder://{}?font=/nonexistent/font.ttf",
      dir.path().display()
    ))
    .unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::DrawError(_))
    ));
  }

  #[test]
  fn record_mode_writes_image_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let frame = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
    let result = DetectResult::new(
      vec![Detection::new(
        0,
        "person",
        0.9,
        BoundingBox::from_corners(0.0, 0.0, 2.0, 2.0),
        BoxUnits::TensorPixels,
      )],
      TargetSize::new(4, 4),
    );

    output(dir.path(), "?record=json")
      .render_result(&frame, &result)
      .unwrap();
    let files = files_under(dir.path());
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|p| p.extension().unwrap() == "json"));
    assert!(files.iter().any(|p| p.extension().unwrap() == "png"));
  }
}
