// 该文件是 Xifeng （西风） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use image::RgbaImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::DetectResult, output::Render};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 只把检测结果写进日志，坐标换算到原始帧
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    Ok(LogOutput)
  }
}

impl Render<RgbaImage, DetectResult> for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, frame: &RgbaImage, result: &DetectResult) -> Result<(), Self::Error> {
    if result.is_empty() {
      info!("没有检测到物体");
      return Ok(());
    }

    info!("检测到 {} 个物体", result.len());
    let (width, height) = frame.dimensions();
    for det in result.items.iter() {
      let b = result.surface_box(det, width, height);
      info!(
        "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
        det.class_name(),
        det.score() * 100.0,
        b.x1,
        b.y1,
        b.width(),
        b.height()
      );
    }
    Ok(())
  }
}
