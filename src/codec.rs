// 该文件是 Xifeng （西风） 项目的一部分。
// src/codec.rs - 像素缓冲区到模型输入张量的编码
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

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  frame::{PixelBuffer, RGBA_CHANNELS},
  tensor::{Tensor, TensorError},
};

const RGB_CHANNELS: usize = 3;
pub const DEFAULT_INPUT_NAME: &str = "images";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
  #[error("输入尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}，请先缩放到目标尺寸")]
  ShapeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("像素缓冲区长度不匹配: 期望 {expected}, 实际 {actual}")]
  BufferLength { expected: usize, actual: usize },
  #[error("归一化参数无效: {0}")]
  InvalidNormalization(String),
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
}

/// 模型输入分辨率
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
  pub width: u32,
  pub height: u32,
}

impl TargetSize {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }
}

impl Default for TargetSize {
  fn default() -> Self {
    Self::new(640, 640)
  }
}

/// 每个通道的归一化参数: `(v * scale - mean[c]) / std[c]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeConfig {
  scale: f32,
  mean: [f32; 3],
  std: [f32; 3],
}

impl Default for NormalizeConfig {
  fn default() -> Self {
    Self {
      scale: 1.0 / 255.0,
      mean: [0.0; 3],
      std: [1.0; 3],
    }
  }
}

impl NormalizeConfig {
  pub fn new(scale: f32, mean: [f32; 3], std: [f32; 3]) -> Result<Self, CodecError> {
    if !scale.is_finite() {
      return Err(CodecError::InvalidNormalization(format!(
        "缩放系数必须是有限值: {}",
        scale
      )));
    }
    if let Some(c) = std.iter().position(|s| !s.is_finite() || *s == 0.0) {
      return Err(CodecError::InvalidNormalization(format!(
        "通道 {} 的标准差无效: {}",
        c, std[c]
      )));
    }
    if let Some(c) = mean.iter().position(|m| !m.is_finite()) {
      return Err(CodecError::InvalidNormalization(format!(
        "通道 {} 的均值无效: {}",
        c, mean[c]
      )));
    }
    Ok(Self { scale, mean, std })
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn mean(&self) -> [f32; 3] {
    self.mean
  }

  pub fn std(&self) -> [f32; 3] {
    self.std
  }

  #[inline]
  fn apply(&self, channel: usize, value: u8) -> f32 {
    (value as f32 * self.scale - self.mean[channel]) / self.std[channel]
  }
}

/// 将 RGBA 交错像素转为 `[1, 3, H, W]` 的平面浮点张量
///
/// 丢弃 alpha 通道。编码是纯函数，不持有可变状态，可在线程间共享。
#[derive(Debug, Clone)]
pub struct TensorCodec {
  normalize: NormalizeConfig,
  input_name: String,
}

impl Default for TensorCodec {
  fn default() -> Self {
    Self::new(NormalizeConfig::default())
  }
}

impl TensorCodec {
  pub fn new(normalize: NormalizeConfig) -> Self {
    Self {
      normalize,
      input_name: DEFAULT_INPUT_NAME.to_string(),
    }
  }

  pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
    self.input_name = name.into();
    self
  }

  pub fn normalize(&self) -> &NormalizeConfig {
    &self.normalize
  }

  pub fn input_name(&self) -> &str {
    &self.input_name
  }

  /// 编码像素缓冲区
  ///
  /// 缓冲区尺寸必须与目标尺寸完全一致，否则返回 [`CodecError::ShapeMismatch`]；
  /// 缩放由调用方在编码前完成。
  pub fn encode(
    &self,
    pixels: &PixelBuffer,
    target_width: u32,
    target_height: u32,
  ) -> Result<Tensor, CodecError> {
    if pixels.dimensions() != (target_width, target_height) {
      error!(
        "输入尺寸 {}x{} 与目标尺寸 {}x{} 不一致",
        pixels.width(),
        pixels.height(),
        target_width,
        target_height
      );
      return Err(CodecError::ShapeMismatch {
        expected: (target_width, target_height),
        actual: pixels.dimensions(),
      });
    }

    let height = target_height as usize;
    let width = target_width as usize;
    let plane = height * width;
    let mut data = vec![0f32; RGB_CHANNELS * plane];
    let rgba = pixels.as_rgba();

    for (idx, pixel) in rgba.chunks_exact(RGBA_CHANNELS).enumerate() {
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = self.normalize.apply(c, pixel[c]);
      }
    }

    debug!("编码输入张量: [1, 3, {}, {}]", height, width);
    Ok(Tensor::new(
      self.input_name.clone(),
      vec![1, RGB_CHANNELS, height, width],
      data,
    )?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn constant_buffer(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba
      .iter()
      .copied()
      .cycle()
      .take(width as usize * height as usize * RGBA_CHANNELS)
      .collect()
  }

  #[test]
  fn encodes_red_frame_into_planar_tensor() {
    let data = constant_buffer(2, 2, [255, 0, 0, 255]);
    let pixels = PixelBuffer::new(2, 2, &data).unwrap();
    let tensor = TensorCodec::default().encode(&pixels, 2, 2).unwrap();

    assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
    assert_eq!(tensor.name(), DEFAULT_INPUT_NAME);
    assert_eq!(&tensor.data()[0..4], &[1.0; 4]);
    assert_eq!(&tensor.data()[4..12], &[0.0; 8]);
  }

  #[test]
  fn keeps_row_major_order_within_planes() {
    // 2x1: 左像素 (10, 20, 30)，右像素 (40, 50, 60)
    let data = [10, 20, 30, 255, 40, 50, 60, 0];
    let pixels = PixelBuffer::new(2, 1, &data).unwrap();
    let codec = TensorCodec::new(NormalizeConfig::new(1.0, [0.0; 3], [1.0; 3]).unwrap());
    let tensor = codec.encode(&pixels, 2, 1).unwrap();

    assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
    assert_eq!(tensor.data(), &[10.0, 40.0, 20.0, 50.0, 30.0, 60.0]);
  }

  #[test]
  fn rejects_mismatched_target() {
    let data = constant_buffer(4, 2, [0, 0, 0, 0]);
    let pixels = PixelBuffer::new(4, 2, &data).unwrap();
    let err = TensorCodec::default().encode(&pixels, 2, 4).unwrap_err();

    assert_eq!(
      err,
      CodecError::ShapeMismatch {
        expected: (2, 4),
        actual: (4, 2)
      }
    );
  }

  #[test]
  fn applies_mean_and_std() {
    let data = constant_buffer(1, 1, [255, 128, 0, 7]);
    let pixels = PixelBuffer::new(1, 1, &data).unwrap();
    let normalize = NormalizeConfig::new(1.0 / 255.0, [0.5, 0.5, 0.5], [0.5, 0.25, 2.0]).unwrap();
    let tensor = TensorCodec::new(normalize).encode(&pixels, 1, 1).unwrap();

    let expected = [
      (1.0 - 0.5) / 0.5,
      (128.0 / 255.0 - 0.5) / 0.25,
      (0.0 - 0.5) / 2.0,
    ];
    for (got, want) in tensor.data().iter().zip(expected) {
      assert!((got - want).abs() < 1e-6, "{got} != {want}");
    }
  }

  #[test]
  fn rejects_zero_std() {
    let err = NormalizeConfig::new(1.0, [0.0; 3], [1.0, 0.0, 1.0]).unwrap_err();
    assert!(matches!(err, CodecError::InvalidNormalization(_)));
  }

  #[test]
  fn custom_input_name() {
    let data = constant_buffer(1, 1, [0, 0, 0, 0]);
    let pixels = PixelBuffer::new(1, 1, &data).unwrap();
    let tensor = TensorCodec::default()
      .with_input_name("input.1")
      .encode(&pixels, 1, 1)
      .unwrap();
    assert_eq!(tensor.name(), "input.1");
  }
}
