// 该文件是 Xifeng （西风） 项目的一部分。
// src/frame.rs - RGBA 像素缓冲区定义
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

use image::{RgbaImage, imageops::FilterType};
use tracing::debug;

use crate::codec::CodecError;

pub const RGBA_CHANNELS: usize = 4;

/// 交错 RGBA 像素的只读视图，行优先，原点在左上角
///
/// 缓冲区归调用方（采集/界面层）所有，流水线只读取它。
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
  width: u32,
  height: u32,
  data: &'a [u8],
}

impl<'a> PixelBuffer<'a> {
  pub fn new(width: u32, height: u32, data: &'a [u8]) -> Result<Self, CodecError> {
    let expected = (width as usize)
      .checked_mul(height as usize)
      .and_then(|n| n.checked_mul(RGBA_CHANNELS));
    if expected != Some(data.len()) {
      return Err(CodecError::BufferLength {
        expected: expected.unwrap_or(usize::MAX),
        actual: data.len(),
      });
    }
    Ok(Self {
      width,
      height,
      data,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn as_rgba(&self) -> &'a [u8] {
    self.data
  }

  /// 按 (x, y) 取出一个像素的四个通道
  pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
    if x >= self.width || y >= self.height {
      return None;
    }
    let idx = (y as usize * self.width as usize + x as usize) * RGBA_CHANNELS;
    let p = &self.data[idx..idx + RGBA_CHANNELS];
    Some([p[0], p[1], p[2], p[3]])
  }
}

impl<'a> From<&'a RgbaImage> for PixelBuffer<'a> {
  fn from(image: &'a RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    PixelBuffer {
      width,
      height,
      data: image.as_raw(),
    }
  }
}

/// 将采集到的帧缩放到模型输入尺寸
///
/// 缩放属于外部图像操作，编码器本身不做任何采样。
pub fn resize_to_target(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
  if image.dimensions() == (width, height) {
    return image.clone();
  }
  debug!(
    "缩放帧: {}x{} -> {}x{}",
    image.width(),
    image.height(),
    width,
    height
  );
  image::imageops::resize(image, width, height, FilterType::Triangle)
}
