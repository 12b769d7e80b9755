// 该文件是 Xifeng （西风） 项目的一部分。
// src/model/decoder.rs - 模型原始输出解码
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
  model::{BoundingBox, BoxUnits, Detection, LabelTable},
  tensor::{RawModelOutput, Tensor},
};

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_ROW_STRIDE: usize = 6;
pub const DEFAULT_SCORE_OUTPUT: &str = "score";
pub const DEFAULT_BOX_OUTPUT: &str = "batchno_classid_x1y1x2y2";

// 每行至少 6 列，多出的列忽略
const MIN_ROW_STRIDE: usize = 6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("未知类别 {class_id} (第 {row} 行)，标签表共 {num_classes} 个类别")]
  UnknownClass {
    class_id: f32,
    row: usize,
    num_classes: usize,
  },
  #[error("模型输出与配置的布局不符: {0}")]
  InvalidOutputSchema(String),
}

impl DecodeError {
  fn schema(msg: impl Into<String>) -> Self {
    DecodeError::InvalidOutputSchema(msg.into())
  }
}

/// 模型输出的布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLayout {
  /// 两个并列张量: 长度为 N 的分数，和 `[N, stride]` 的 `[batch, class, x1, y1, x2, y2]`
  SeparateScoreAndBox {
    score_output: String,
    box_output: String,
  },
  /// 单个 `[N, stride]` 张量: `[x, y, w, h, confidence, class]`，未指定名称时取第一个输出
  PackedRow { output: Option<String> },
}

impl Default for OutputLayout {
  fn default() -> Self {
    OutputLayout::SeparateScoreAndBox {
      score_output: DEFAULT_SCORE_OUTPUT.to_string(),
      box_output: DEFAULT_BOX_OUTPUT.to_string(),
    }
  }
}

/// 行内四个坐标值的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateSpace {
  /// 张量像素下的角点 (x1, y1, x2, y2)
  #[default]
  AbsolutePixels,
  /// 左上角加宽高 (x, y, w, h)
  NormalizedXYWH,
  /// 角点 (x1, y1, x2, y2)
  NormalizedXYXY,
  /// 中心点加宽高 (cx, cy, w, h)
  CenterXYWH,
}

impl CoordinateSpace {
  fn to_box(self, a: f32, b: f32, c: f32, d: f32) -> BoundingBox {
    match self {
      CoordinateSpace::AbsolutePixels | CoordinateSpace::NormalizedXYXY => {
        BoundingBox::from_corners(a, b, c, d)
      }
      CoordinateSpace::NormalizedXYWH => BoundingBox::from_xywh(a, b, c, d),
      CoordinateSpace::CenterXYWH => BoundingBox::from_center(a, b, c, d),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
  pub layout: OutputLayout,
  pub row_stride: usize,
  pub score_threshold: f32,
  pub coordinate_space: CoordinateSpace,
  /// 非 `AbsolutePixels` 坐标的单位，解码器不做换算
  pub units: BoxUnits,
}

impl Default for DecoderConfig {
  fn default() -> Self {
    Self {
      layout: OutputLayout::default(),
      row_stride: DEFAULT_ROW_STRIDE,
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      coordinate_space: CoordinateSpace::AbsolutePixels,
      units: BoxUnits::TensorPixels,
    }
  }
}

impl DecoderConfig {
  pub fn packed_row() -> Self {
    Self {
      layout: OutputLayout::PackedRow { output: None },
      coordinate_space: CoordinateSpace::NormalizedXYWH,
      ..Self::default()
    }
  }

  pub fn with_score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn with_coordinate_space(mut self, space: CoordinateSpace) -> Self {
    self.coordinate_space = space;
    self
  }

  pub fn with_units(mut self, units: BoxUnits) -> Self {
    self.units = units;
    self
  }

  pub fn with_row_stride(mut self, stride: usize) -> Self {
    self.row_stride = stride;
    self
  }

  fn box_units(&self) -> BoxUnits {
    match self.coordinate_space {
      CoordinateSpace::AbsolutePixels => BoxUnits::TensorPixels,
      _ => self.units,
    }
  }
}

/// 将模型输出解码为检测结果列表
///
/// 输出顺序与原始张量的行顺序一致，不按分数排序。
#[derive(Debug, Clone)]
pub struct DetectionDecoder {
  labels: LabelTable,
  config: DecoderConfig,
}

impl DetectionDecoder {
  pub fn new(labels: LabelTable, config: DecoderConfig) -> Self {
    Self { labels, config }
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn config(&self) -> &DecoderConfig {
    &self.config
  }

  pub fn decode(&self, output: &RawModelOutput) -> Result<Vec<Detection>, DecodeError> {
    let stride = self.config.row_stride;
    if stride < MIN_ROW_STRIDE {
      return Err(DecodeError::schema(format!(
        "行步长 {} 小于 {}",
        stride, MIN_ROW_STRIDE
      )));
    }

    debug!("解码模型输出: {} 个张量", output.len());
    let detections = match &self.config.layout {
      OutputLayout::SeparateScoreAndBox {
        score_output,
        box_output,
      } => {
        let (scores, boxes) = self.separate_tensors(output, score_output, box_output)?;
        self.decode_separate(scores, boxes)?
      }
      OutputLayout::PackedRow { output: name } => {
        let packed = self.packed_tensor(output, name.as_deref())?;
        self.decode_packed(packed)?
      }
    };
    debug!("解码得到 {} 个检测结果", detections.len());
    Ok(detections)
  }

  fn separate_tensors<'a>(
    &self,
    output: &'a RawModelOutput,
    score_name: &str,
    box_name: &str,
  ) -> Result<(&'a Tensor, &'a Tensor), DecodeError> {
    if let (Some(scores), Some(boxes)) = (output.by_name(score_name), output.by_name(box_name)) {
      return Ok((scores, boxes));
    }

    if output.len() != 2 {
      error!(
        "找不到输出 '{}' / '{}'，且输出数量为 {}",
        score_name,
        box_name,
        output.len()
      );
      return Err(DecodeError::schema(format!(
        "期望 2 个输出张量 ('{}', '{}')，实际 {} 个",
        score_name,
        box_name,
        output.len()
      )));
    }

    // 名称不符时按元素数量判断哪个是分数，哪个是检测框
    let (first, second) = match (output.get(0), output.get(1)) {
      (Some(first), Some(second)) => (first, second),
      _ => return Err(DecodeError::schema("输出张量缺失")),
    };
    let stride = self.config.row_stride;
    if second.len() == first.len() * stride {
      debug!(
        "输出顺序正常 - '{}' 是分数，'{}' 是检测框",
        first.name(),
        second.name()
      );
      Ok((first, second))
    } else if first.len() == second.len() * stride {
      debug!(
        "输出顺序交换 - '{}' 是检测框，'{}' 是分数",
        first.name(),
        second.name()
      );
      Ok((second, first))
    } else {
      error!(
        "输出大小不匹配 - 张量1: {}, 张量2: {}, 行步长: {}",
        first.len(),
        second.len(),
        stride
      );
      Err(DecodeError::schema(format!(
        "无法根据大小区分分数与检测框: {} / {}",
        first.len(),
        second.len()
      )))
    }
  }

  fn packed_tensor<'a>(
    &self,
    output: &'a RawModelOutput,
    name: Option<&str>,
  ) -> Result<&'a Tensor, DecodeError> {
    match name {
      Some(name) => output
        .by_name(name)
        .ok_or_else(|| DecodeError::schema(format!("找不到输出 '{}'", name))),
      None => {
        if output.len() != 1 {
          return Err(DecodeError::schema(format!(
            "打包布局期望 1 个输出张量，实际 {} 个",
            output.len()
          )));
        }
        output
          .get(0)
          .ok_or_else(|| DecodeError::schema("输出张量缺失"))
      }
    }
  }

  fn check_rows(&self, tensor: &Tensor) -> Result<usize, DecodeError> {
    let stride = self.config.row_stride;
    if tensor.shape().len() >= 2 && tensor.shape().last() != Some(&stride) {
      return Err(DecodeError::schema(format!(
        "张量 '{}' 形状 {:?} 的最后一维不等于行步长 {}",
        tensor.name(),
        tensor.shape(),
        stride
      )));
    }
    if tensor.len() % stride != 0 {
      return Err(DecodeError::schema(format!(
        "张量 '{}' 长度 {} 不是行步长 {} 的整数倍",
        tensor.name(),
        tensor.len(),
        stride
      )));
    }
    Ok(tensor.len() / stride)
  }

  fn decode_separate(
    &self,
    scores: &Tensor,
    boxes: &Tensor,
  ) -> Result<Vec<Detection>, DecodeError> {
    let rows = self.check_rows(boxes)?;
    if rows != scores.len() {
      return Err(DecodeError::schema(format!(
        "分数数量 {} 与检测框行数 {} 不一致",
        scores.len(),
        rows
      )));
    }

    let stride = self.config.row_stride;
    let data = boxes.data();
    let mut items = Vec::new();
    for (row, &score) in scores.data().iter().enumerate() {
      if !self.passes_threshold(score) {
        continue;
      }
      // [batch, class, x1, y1, x2, y2]
      let r = &data[row * stride..(row + 1) * stride];
      items.push(self.detection(row, r[1], score, r[2], r[3], r[4], r[5])?);
    }
    Ok(items)
  }

  fn decode_packed(&self, packed: &Tensor) -> Result<Vec<Detection>, DecodeError> {
    let stride = self.config.row_stride;
    self.check_rows(packed)?;

    let mut items = Vec::new();
    for (row, r) in packed.data().chunks_exact(stride).enumerate() {
      // [x, y, w, h, confidence, class]
      let score = r[4];
      if !self.passes_threshold(score) {
        continue;
      }
      items.push(self.detection(row, r[5], score, r[0], r[1], r[2], r[3])?);
    }
    Ok(items)
  }

  /// 严格大于阈值才保留，NaN 永远不通过
  fn passes_threshold(&self, score: f32) -> bool {
    score > self.config.score_threshold
  }

  #[allow(clippy::too_many_arguments)]
  fn detection(
    &self,
    row: usize,
    raw_class: f32,
    score: f32,
    a: f32,
    b: f32,
    c: f32,
    d: f32,
  ) -> Result<Detection, DecodeError> {
    let class_id = self.resolve_class(row, raw_class)?;
    let class_name = self.labels.get(class_id as usize).unwrap_or_default();
    Ok(Detection::new(
      class_id,
      class_name,
      score,
      self.config.coordinate_space.to_box(a, b, c, d),
      self.config.box_units(),
    ))
  }

  fn resolve_class(&self, row: usize, raw: f32) -> Result<u32, DecodeError> {
    let num_classes = self.labels.len();
    let valid = raw.is_finite() && raw >= 0.0 && raw.fract() == 0.0 && (raw as usize) < num_classes;
    if !valid {
      error!("第 {} 行的类别 {} 不在标签表中 (共 {} 类)", row, raw, num_classes);
      return Err(DecodeError::UnknownClass {
        class_id: raw,
        row,
        num_classes,
      });
    }
    Ok(raw as u32)
  }
}

/// 使用给定标签表与配置解码一次模型输出
pub fn decode(
  output: &RawModelOutput,
  labels: &LabelTable,
  config: &DecoderConfig,
) -> Result<Vec<Detection>, DecodeError> {
  DetectionDecoder::new(labels.clone(), config.clone()).decode(output)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn separate(scores: Vec<f32>, rows: Vec<[f32; 6]>) -> RawModelOutput {
    let n = scores.len();
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    RawModelOutput::new(vec![
      Tensor::new(DEFAULT_SCORE_OUTPUT, vec![n], scores).unwrap(),
      Tensor::new(DEFAULT_BOX_OUTPUT, vec![n, 6], flat).unwrap(),
    ])
  }

  fn packed(rows: Vec<[f32; 6]>) -> RawModelOutput {
    let n = rows.len();
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    RawModelOutput::new(vec![Tensor::new("output0", vec![1, n, 6], flat).unwrap()])
  }

  fn decoder(config: DecoderConfig) -> DetectionDecoder {
    DetectionDecoder::new(LabelTable::coco(), config)
  }

  #[test]
  fn separate_layout_single_row() {
    let output = separate(vec![0.9], vec![[0.0, 0.0, 10.0, 10.0, 50.0, 50.0]]);
    let items = decoder(DecoderConfig::default()).decode(&output).unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id(), 0);
    assert_eq!(items[0].class_name(), "person");
    assert_eq!(items[0].score(), 0.9);
    assert_eq!(
      *items[0].bbox(),
      BoundingBox::from_corners(10.0, 10.0, 50.0, 50.0)
    );
    assert_eq!(items[0].units(), BoxUnits::TensorPixels);

    let none = decoder(DecoderConfig::default().with_score_threshold(0.95))
      .decode(&output)
      .unwrap();
    assert!(none.is_empty());
  }

  #[test]
  fn threshold_is_strict() {
    let output = separate(
      vec![0.5, f32::from_bits(0.5f32.to_bits() + 1), f32::NAN],
      vec![[0.0, 1.0, 0.0, 0.0, 1.0, 1.0]; 3],
    );
    let items = decoder(DecoderConfig::default()).decode(&output).unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].score() > 0.5);
  }

  #[test]
  fn swapped_corners_are_normalized() {
    let output = separate(vec![0.8], vec![[0.0, 2.0, 50.0, 60.0, 10.0, 20.0]]);
    let items = decoder(DecoderConfig::default()).decode(&output).unwrap();
    let b = items[0].bbox();
    assert_eq!((b.x1, b.y1, b.x2, b.y2), (10.0, 20.0, 50.0, 60.0));
  }

  #[test]
  fn unknown_class_fails_whole_decode() {
    let output = separate(
      vec![0.9, 0.9],
      vec![
        [0.0, 1.0, 0.0, 0.0, 1.0, 1.0],
        [0.0, 80.0, 0.0, 0.0, 1.0, 1.0],
      ],
    );
    let err = decoder(DecoderConfig::default()).decode(&output).unwrap_err();
    assert_eq!(
      err,
      DecodeError::UnknownClass {
        class_id: 80.0,
        row: 1,
        num_classes: 80
      }
    );
  }

  #[test]
  fn unknown_class_below_threshold_is_skipped() {
    let output = separate(vec![0.1], vec![[0.0, 999.0, 0.0, 0.0, 1.0, 1.0]]);
    let items = decoder(DecoderConfig::default()).decode(&output).unwrap();
    assert!(items.is_empty());
  }

  #[test]
  fn fractional_and_negative_class_ids_are_unknown() {
    for raw in [1.5, -1.0, f32::INFINITY] {
      let output = separate(vec![0.9], vec![[0.0, raw, 0.0, 0.0, 1.0, 1.0]]);
      let err = decoder(DecoderConfig::default()).decode(&output).unwrap_err();
      assert!(matches!(err, DecodeError::UnknownClass { row: 0, .. }));
    }
  }

  #[test]
  fn separate_layout_falls_back_to_sizes() {
    // 名称不符，且顺序交换
    let output = RawModelOutput::new(vec![
      Tensor::new("boxes", vec![2, 6], vec![
        0.0, 2.0, 1.0, 1.0, 3.0, 3.0, //
        0.0, 3.0, 4.0, 4.0, 8.0, 8.0,
      ])
      .unwrap(),
      Tensor::new("scores", vec![2], vec![0.3, 0.7]).unwrap(),
    ]);
    let items = decoder(DecoderConfig::default()).decode(&output).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_name(), "motorcycle");
  }

  #[test]
  fn separate_layout_rejects_wrong_tensor_count() {
    let output = RawModelOutput::new(vec![Tensor::new("x", vec![1], vec![0.9]).unwrap()]);
    let err = decoder(DecoderConfig::default()).decode(&output).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidOutputSchema(_)));
  }

  #[test]
  fn separate_layout_rejects_row_count_mismatch() {
    let output = RawModelOutput::new(vec![
      Tensor::new(DEFAULT_SCORE_OUTPUT, vec![3], vec![0.9, 0.9, 0.9]).unwrap(),
      Tensor::new(DEFAULT_BOX_OUTPUT, vec![2, 6], vec![0.0; 12]).unwrap(),
    ]);
    let err = decoder(DecoderConfig::default()).decode(&output).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidOutputSchema(_)));
  }

  #[test]
  fn rejects_wrong_row_stride() {
    let output = RawModelOutput::new(vec![
      Tensor::new(DEFAULT_SCORE_OUTPUT, vec![1], vec![0.9]).unwrap(),
      Tensor::new(DEFAULT_BOX_OUTPUT, vec![1, 7], vec![0.0; 7]).unwrap(),
    ]);
    let err = decoder(DecoderConfig::default()).decode(&output).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidOutputSchema(_)));

    let err = decoder(DecoderConfig::default().with_row_stride(4))
      .decode(&output)
      .unwrap_err();
    assert!(matches!(err, DecodeError::InvalidOutputSchema(_)));
  }

  #[test]
  fn wider_rows_ignore_extra_columns() {
    let output = RawModelOutput::new(vec![
      Tensor::new(DEFAULT_SCORE_OUTPUT, vec![1], vec![0.9]).unwrap(),
      Tensor::new(DEFAULT_BOX_OUTPUT, vec![1, 7], vec![0.0, 3.0, 1.0, 2.0, 3.0, 4.0, 99.0]).unwrap(),
    ]);
    let items = decoder(DecoderConfig::default().with_row_stride(7))
      .decode(&output)
      .unwrap();
    assert_eq!(items[0].class_id(), 3);
    assert_eq!(*items[0].bbox(), BoundingBox::from_corners(1.0, 2.0, 3.0, 4.0));
  }

  #[test]
  fn packed_layout_converts_xywh() {
    let output = packed(vec![
      [10.0, 20.0, 30.0, 40.0, 0.9, 2.0],
      [0.0, 0.0, 5.0, 5.0, 0.4, 1.0],
      [100.0, 100.0, -20.0, 10.0, 0.6, 0.0],
    ]);
    let items = decoder(DecoderConfig::packed_row()).decode(&output).unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_name(), "car");
    assert_eq!(
      *items[0].bbox(),
      BoundingBox::from_corners(10.0, 20.0, 40.0, 60.0)
    );
    assert_eq!(
      *items[1].bbox(),
      BoundingBox::from_corners(80.0, 100.0, 100.0, 110.0)
    );
  }

  #[test]
  fn packed_layout_center_and_corner_forms() {
    let output = packed(vec![[0.5, 0.5, 0.2, 0.4, 0.9, 0.0]]);
    let config = DecoderConfig::packed_row()
      .with_coordinate_space(CoordinateSpace::CenterXYWH)
      .with_units(BoxUnits::Normalized);
    let items = decoder(config).decode(&output).unwrap();
    let b = items[0].bbox();
    assert!((b.x1 - 0.4).abs() < 1e-6 && (b.x2 - 0.6).abs() < 1e-6);
    assert!((b.y1 - 0.3).abs() < 1e-6 && (b.y2 - 0.7).abs() < 1e-6);
    assert_eq!(items[0].units(), BoxUnits::Normalized);

    let config = DecoderConfig::packed_row().with_coordinate_space(CoordinateSpace::NormalizedXYXY);
    let items = decoder(config).decode(&output).unwrap();
    assert_eq!(*items[0].bbox(), BoundingBox::from_corners(0.2, 0.4, 0.5, 0.5));
  }

  #[test]
  fn packed_layout_requires_single_or_named_output() {
    let mut output = packed(vec![[0.0, 0.0, 1.0, 1.0, 0.9, 0.0]]);
    output.push(Tensor::new("extra", vec![1], vec![0.0]).unwrap());

    let err = decoder(DecoderConfig::packed_row()).decode(&output).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidOutputSchema(_)));

    let config = DecoderConfig {
      layout: OutputLayout::PackedRow {
        output: Some("output0".to_string()),
      },
      ..DecoderConfig::packed_row()
    };
    assert_eq!(decoder(config).decode(&output).unwrap().len(), 1);
  }

  #[test]
  fn absolute_pixels_ignore_configured_units() {
    let output = separate(vec![0.9], vec![[0.0, 0.0, 1.0, 1.0, 2.0, 2.0]]);
    let items = decoder(DecoderConfig::default().with_units(BoxUnits::Normalized))
      .decode(&output)
      .unwrap();
    assert_eq!(items[0].units(), BoxUnits::TensorPixels);
  }

  #[test]
  fn keeps_tensor_order() {
    let output = separate(
      vec![0.6, 0.9, 0.7],
      vec![
        [0.0, 0.0, 0.0, 0.0, 1.0, 1.0],
        [0.0, 1.0, 0.0, 0.0, 1.0, 1.0],
        [0.0, 2.0, 0.0, 0.0, 1.0, 1.0],
      ],
    );
    let items = decode(&output, &LabelTable::coco(), &DecoderConfig::default()).unwrap();
    let ids: Vec<u32> = items.iter().map(Detection::class_id).collect();
    assert_eq!(ids, [0, 1, 2]);
  }
}
