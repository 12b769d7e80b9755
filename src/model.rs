// 该文件是 Xifeng （西风） 项目的一部分。
// src/model.rs - 检测结果与模型调用边界
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

use serde::Serialize;

use crate::{
  codec::TargetSize,
  tensor::{RawModelOutput, Tensor},
};

/// 外部持有的模型会话
///
/// 模型的加载、预热与释放都不归流水线管理。对流水线而言这是一次阻塞调用，
/// 宿主可以自行决定阻塞线程、等待 future 或者转发给工作线程。
pub trait ModelInvoker {
  type Error: std::error::Error + Send + Sync + 'static;

  fn invoke(&self, input: Tensor) -> Result<RawModelOutput, Self::Error>;
}

impl<F, E> ModelInvoker for F
where
  F: Fn(Tensor) -> Result<RawModelOutput, E>,
  E: std::error::Error + Send + Sync + 'static,
{
  type Error = E;

  fn invoke(&self, input: Tensor) -> Result<RawModelOutput, Self::Error> {
    self(input)
  }
}

/// 检测框坐标的单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxUnits {
  /// 模型输入张量分辨率下的像素坐标
  #[default]
  TensorPixels,
  /// 相对张量宽高的 [0, 1] 坐标
  Normalized,
}

/// 轴对齐矩形 [x1, y1, x2, y2]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BoundingBox {
  /// 由两个角点构造，交换的坐标会被整理为 x1 <= x2、y1 <= y2
  pub fn from_corners(xa: f32, ya: f32, xb: f32, yb: f32) -> Self {
    Self {
      x1: xa.min(xb),
      y1: ya.min(yb),
      x2: xa.max(xb),
      y2: ya.max(yb),
    }
  }

  pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
    Self::from_corners(x, y, x + w, y + h)
  }

  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self::from_corners(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 宽或高非正时面积为 0
  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  pub fn scale(&self, sx: f32, sy: f32) -> Self {
    Self {
      x1: self.x1 * sx,
      y1: self.y1 * sy,
      x2: self.x2 * sx,
      y2: self.y2 * sy,
    }
  }
}

/// 单个检测结果，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  class_id: u32,
  class_name: String,
  score: f32,
  bbox: BoundingBox,
  units: BoxUnits,
}

impl Detection {
  /// 分数会被限制在 [0, 1]，-0.0 记为 0.0
  pub fn new(
    class_id: u32,
    class_name: impl Into<String>,
    score: f32,
    bbox: BoundingBox,
    units: BoxUnits,
  ) -> Self {
    let score = match score.clamp(0.0, 1.0) {
      s if s == 0.0 => 0.0,
      s => s,
    };
    Self {
      class_id,
      class_name: class_name.into(),
      score,
      bbox,
      units,
    }
  }

  pub fn class_id(&self) -> u32 {
    self.class_id
  }

  pub fn class_name(&self) -> &str {
    &self.class_name
  }

  pub fn score(&self) -> f32 {
    self.score
  }

  pub fn bbox(&self) -> &BoundingBox {
    &self.bbox
  }

  pub fn units(&self) -> BoxUnits {
    self.units
  }
}

/// 一帧的检测结果，附带编码时使用的张量分辨率
///
/// 流水线不会把坐标换算到任意绘制表面，渲染方通过 [`DetectResult::surface_box`] 自行换算。
#[derive(Debug, Clone)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
  pub tensor_size: TargetSize,
}

impl DetectResult {
  pub fn new(items: Vec<Detection>, tensor_size: TargetSize) -> Self {
    Self {
      items: items.into_boxed_slice(),
      tensor_size,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  /// 将检测框换算到 `width x height` 的绘制表面
  pub fn surface_box(&self, detection: &Detection, width: u32, height: u32) -> BoundingBox {
    let (sx, sy) = match detection.units() {
      BoxUnits::Normalized => (width as f32, height as f32),
      BoxUnits::TensorPixels => (
        width as f32 / self.tensor_size.width as f32,
        height as f32 / self.tensor_size.height as f32,
      ),
    };
    detection.bbox().scale(sx, sy)
  }
}

mod decoder;
mod labels;
mod nms;
mod replay;

pub use self::decoder::{
  CoordinateSpace, DEFAULT_BOX_OUTPUT, DEFAULT_ROW_STRIDE, DEFAULT_SCORE_OUTPUT,
  DEFAULT_SCORE_THRESHOLD, DecodeError, DecoderConfig, DetectionDecoder, OutputLayout, decode,
};
pub use self::labels::{COCO_CLASSES, LabelError, LabelTable};
pub use self::nms::{DEFAULT_IOU_THRESHOLD, NmsConfig, iou, suppress, suppress_with};
pub use self::replay::{ReplayError, ReplayInvoker};
