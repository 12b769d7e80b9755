// 该文件是 Xifeng （西风） 项目的一部分。
// src/tensor.rs - 张量与模型原始输出
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
  #[error("张量 {name} 数据长度不匹配: 形状 {shape:?} 期望 {expected} 个元素, 实际 {actual} 个")]
  LengthMismatch {
    name: String,
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
}

/// 带名称和形状的 32 位浮点张量
///
/// 张量由产生它的阶段独占，沿流水线向前移动，不在阶段之间共享。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorRepr")]
pub struct Tensor {
  name: String,
  shape: Vec<usize>,
  data: Box<[f32]>,
}

#[derive(Deserialize)]
struct TensorRepr {
  name: String,
  shape: Vec<usize>,
  data: Vec<f32>,
}

impl TryFrom<TensorRepr> for Tensor {
  type Error = TensorError;

  fn try_from(repr: TensorRepr) -> Result<Self, Self::Error> {
    Tensor::new(repr.name, repr.shape, repr.data)
  }
}

impl Tensor {
  pub fn new(
    name: impl Into<String>,
    shape: Vec<usize>,
    data: impl Into<Box<[f32]>>,
  ) -> Result<Self, TensorError> {
    let name = name.into();
    let data = data.into();
    let expected = shape.iter().product::<usize>();
    if expected != data.len() {
      return Err(TensorError::LengthMismatch {
        name,
        shape,
        expected,
        actual: data.len(),
      });
    }
    Ok(Tensor { name, shape, data })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn into_data(self) -> Box<[f32]> {
    self.data
  }
}

/// 模型调用返回的一组具名张量，保持模型给出的顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawModelOutput {
  tensors: Vec<Tensor>,
}

impl RawModelOutput {
  pub fn new(tensors: Vec<Tensor>) -> Self {
    RawModelOutput { tensors }
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Tensor> {
    self.tensors.get(index)
  }

  pub fn by_name(&self, name: &str) -> Option<&Tensor> {
    self.tensors.iter().find(|t| t.name() == name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
    self.tensors.iter()
  }

  pub fn push(&mut self, tensor: Tensor) {
    self.tensors.push(tensor);
  }
}

impl From<Vec<Tensor>> for RawModelOutput {
  fn from(tensors: Vec<Tensor>) -> Self {
    RawModelOutput::new(tensors)
  }
}

impl FromIterator<Tensor> for RawModelOutput {
  fn from_iter<I: IntoIterator<Item = Tensor>>(iter: I) -> Self {
    RawModelOutput::new(iter.into_iter().collect())
  }
}
