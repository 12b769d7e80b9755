// 该文件是 Xifeng （西风） 项目的一部分。
// src/pipeline.rs - 检测流水线
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

//! 编码 → 外部模型调用 → 解码 → NMS。
//!
//! 流水线无状态、无锁。同一个模型会话不应被并发调用，除非会话本身声明支持；
//! 实时视频需要调用方自行限速，上一帧的 [`DetectionPipeline::detect`] 返回后再提交下一帧。

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  codec::{CodecError, NormalizeConfig, TargetSize, TensorCodec},
  frame::PixelBuffer,
  model::{
    DecodeError, DecoderConfig, Detection, DetectionDecoder, LabelTable, ModelInvoker, NmsConfig,
    suppress_with,
  },
};

/// 错误类别，用于区分失败与“没有检测结果”
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  ShapeMismatch,
  UnknownClass,
  InvalidOutputSchema,
  ModelInvocationError,
  InvalidInput,
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("编码错误: {0}")]
  Codec(#[from] CodecError),
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("模型调用错误: {0}")]
  ModelInvocation(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::Codec(CodecError::ShapeMismatch { .. }) => ErrorKind::ShapeMismatch,
      PipelineError::Codec(_) => ErrorKind::InvalidInput,
      PipelineError::Decode(DecodeError::UnknownClass { .. }) => ErrorKind::UnknownClass,
      PipelineError::Decode(DecodeError::InvalidOutputSchema(_)) => ErrorKind::InvalidOutputSchema,
      PipelineError::ModelInvocation(_) => ErrorKind::ModelInvocationError,
    }
  }
}

#[derive(Debug, Clone)]
pub struct DetectionPipeline {
  target: TargetSize,
  codec: TensorCodec,
  decoder: DetectionDecoder,
  nms: NmsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct DetectionPipelineBuilder {
  target: TargetSize,
  normalize: NormalizeConfig,
  input_name: Option<String>,
  labels: Option<LabelTable>,
  decoder: DecoderConfig,
  nms: NmsConfig,
}

impl DetectionPipelineBuilder {
  pub fn target_size(mut self, width: u32, height: u32) -> Self {
    self.target = TargetSize::new(width, height);
    self
  }

  pub fn normalize(mut self, normalize: NormalizeConfig) -> Self {
    self.normalize = normalize;
    self
  }

  pub fn input_name(mut self, name: impl Into<String>) -> Self {
    self.input_name = Some(name.into());
    self
  }

  pub fn labels(mut self, labels: LabelTable) -> Self {
    self.labels = Some(labels);
    self
  }

  pub fn decoder(mut self, config: DecoderConfig) -> Self {
    self.decoder = config;
    self
  }

  pub fn nms(mut self, config: NmsConfig) -> Self {
    self.nms = config;
    self
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Self {
    self.nms.iou_threshold = threshold;
    self
  }

  /// 未指定标签表时使用 COCO 80 类
  pub fn build(self) -> DetectionPipeline {
    let mut codec = TensorCodec::new(self.normalize);
    if let Some(name) = self.input_name {
      codec = codec.with_input_name(name);
    }
    let labels = self.labels.unwrap_or_default();
    debug!(
      "创建检测流水线: 输入 {}x{}, {} 个类别",
      self.target.width,
      self.target.height,
      labels.len()
    );
    DetectionPipeline {
      target: self.target,
      codec,
      decoder: DetectionDecoder::new(labels, self.decoder),
      nms: self.nms,
    }
  }
}

impl DetectionPipeline {
  pub fn builder() -> DetectionPipelineBuilder {
    DetectionPipelineBuilder::default()
  }

  pub fn target_size(&self) -> TargetSize {
    self.target
  }

  pub fn labels(&self) -> &LabelTable {
    self.decoder.labels()
  }

  pub fn decoder_config(&self) -> &DecoderConfig {
    self.decoder.config()
  }

  pub fn nms_config(&self) -> &NmsConfig {
    &self.nms
  }

  /// 对一帧执行检测
  ///
  /// 没有检测结果时返回空列表；任何一步出错都直接返回错误，不给出部分结果。
  pub fn detect<M: ModelInvoker>(
    &self,
    pixels: &PixelBuffer,
    invoker: &M,
  ) -> Result<Vec<Detection>, PipelineError> {
    let tensor = self
      .codec
      .encode(pixels, self.target.width, self.target.height)?;

    debug!("调用模型");
    let output = invoker.invoke(tensor).map_err(|e| {
      error!("模型调用失败: {}", e);
      PipelineError::ModelInvocation(Box::new(e))
    })?;

    let decoded = self.decoder.decode(&output)?;
    Ok(suppress_with(decoded, &self.nms))
  }
}

/// 一次性执行完整的检测流程
pub fn detect<M: ModelInvoker>(
  pixels: &PixelBuffer,
  target_size: TargetSize,
  invoker: &M,
  labels: &LabelTable,
  decoder_config: &DecoderConfig,
  iou_threshold: f32,
) -> Result<Vec<Detection>, PipelineError> {
  DetectionPipeline::builder()
    .target_size(target_size.width, target_size.height)
    .labels(labels.clone())
    .decoder(decoder_config.clone())
    .iou_threshold(iou_threshold)
    .build()
    .detect(pixels, invoker)
}
