// 该文件是 Xifeng （西风） 项目的一部分。
// src/model/replay.rs - 回放录制的模型输出
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

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::ModelInvoker,
  tensor::{RawModelOutput, Tensor},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("录制文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("录制文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("输入张量形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  InputShapeMismatch {
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
}

#[derive(Deserialize)]
struct Recording {
  #[serde(default)]
  input_shape: Option<Vec<usize>>,
  outputs: RawModelOutput,
}

/// 每次调用都返回同一份录制输出的模型
///
/// 录制文件格式:
/// `{"input_shape": [1, 3, 640, 640], "outputs": [{"name": "...", "shape": [...], "data": [...]}]}`，
/// `input_shape` 可省略。
#[derive(Debug, Clone)]
pub struct ReplayInvoker {
  input_shape: Option<Vec<usize>>,
  output: RawModelOutput,
}

impl FromUrlWithScheme for ReplayInvoker {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayInvoker {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }
    Self::from_file(recording_path(url))
  }
}

/// `replay:///abs/out.json` 取路径；`replay://out.json` 这类写法里文件名落在 host 上，需要拼回去
fn recording_path(url: &Url) -> PathBuf {
  match url.host_str() {
    Some(host) if !host.is_empty() => PathBuf::from(format!("{}{}", host, url.path())),
    _ => PathBuf::from(url.path()),
  }
}

impl ReplayInvoker {
  pub fn new(output: RawModelOutput) -> Self {
    Self {
      input_shape: None,
      output,
    }
  }

  pub fn with_input_shape(mut self, shape: Vec<usize>) -> Self {
    self.input_shape = Some(shape);
    self
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
    let path = path.as_ref();
    info!("加载录制的模型输出: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let recording: Recording = serde_json::from_str(&content)?;
    debug!("录制输出包含 {} 个张量", recording.outputs.len());
    Ok(Self {
      input_shape: recording.input_shape,
      output: recording.outputs,
    })
  }
}

impl ModelInvoker for ReplayInvoker {
  type Error = ReplayError;

  fn invoke(&self, input: Tensor) -> Result<RawModelOutput, Self::Error> {
    if let Some(expected) = &self.input_shape
      && expected.as_slice() != input.shape()
    {
      error!(
        "输入张量形状 {:?} 与录制时的 {:?} 不一致",
        input.shape(),
        expected
      );
      return Err(ReplayError::InputShapeMismatch {
        expected: expected.clone(),
        actual: input.shape().to_vec(),
      });
    }
    Ok(self.output.clone())
  }
}
