// 该文件是 Xifeng （西风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

use xifeng::model::{
  BoxUnits, CoordinateSpace, DEFAULT_BOX_OUTPUT, DEFAULT_SCORE_OUTPUT, DecoderConfig, NmsConfig,
  OutputLayout,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
  /// 处理第一帧
  Oneshot,
  /// 对第一帧反复推理并统计平均耗时
  Repeat,
  /// 逐帧处理全部输入
  Continuous,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
  /// 分数与 [batch, class, x1, y1, x2, y2] 分开输出
  Separate,
  /// 单个 [x, y, w, h, confidence, class] 输出
  Packed,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateKind {
  Pixels,
  Xywh,
  Xyxy,
  Center,
}

impl From<CoordinateKind> for CoordinateSpace {
  fn from(kind: CoordinateKind) -> Self {
    match kind {
      CoordinateKind::Pixels => CoordinateSpace::AbsolutePixels,
      CoordinateKind::Xywh => CoordinateSpace::NormalizedXYWH,
      CoordinateKind::Xyxy => CoordinateSpace::NormalizedXYXY,
      CoordinateKind::Center => CoordinateSpace::CenterXYWH,
    }
  }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitsKind {
  /// 模型输入分辨率下的像素
  Tensor,
  /// [0, 1] 相对坐标
  Normalized,
}

impl From<UnitsKind> for BoxUnits {
  fn from(kind: UnitsKind) -> Self {
    match kind {
      UnitsKind::Tensor => BoxUnits::TensorPixels,
      UnitsKind::Normalized => BoxUnits::Normalized,
    }
  }
}

/// Xifeng 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 录制的模型输出，例如 replay:///path/to/output.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源: image://<文件> 或 folder://<目录>
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径: image://<文件>、folder://<目录>?record=name|id|json&always 或 log://
  /// 绘制输出可用 font=<字体文件> 替换内置字体，font=none 只画色块
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  #[arg(long, value_enum, default_value = "oneshot")]
  pub task: TaskKind,
  /// 连续任务的最大帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 重复任务的推理次数
  #[arg(long, default_value = "1000", value_name = "COUNT")]
  pub repeat: usize,

  /// 模型输入宽度
  #[arg(long, default_value = "640")]
  pub width: u32,
  /// 模型输入高度
  #[arg(long, default_value = "640")]
  pub height: u32,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub nms_threshold: f32,
  /// 不区分类别做 NMS
  #[arg(long)]
  pub class_agnostic: bool,
  /// NMS 后最多保留的检测数
  #[arg(long, value_name = "COUNT")]
  pub max_detections: Option<usize>,

  #[arg(long, value_enum, default_value = "separate")]
  pub layout: LayoutKind,
  /// 坐标格式，默认 separate 为 pixels，packed 为 xywh
  #[arg(long, value_enum)]
  pub coordinate_space: Option<CoordinateKind>,
  #[arg(long, value_enum, default_value = "tensor")]
  pub units: UnitsKind,
  #[arg(long, default_value = "6")]
  pub row_stride: usize,
  #[arg(long, default_value = DEFAULT_SCORE_OUTPUT)]
  pub score_output: String,
  #[arg(long, default_value = DEFAULT_BOX_OUTPUT)]
  pub box_output: String,
  /// packed 布局使用的输出名称，缺省取第一个输出
  #[arg(long)]
  pub packed_output: Option<String>,

  /// 标签文件（JSON 数组或每行一个），缺省使用 COCO 80 类
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
}

impl Args {
  pub fn decoder_config(&self) -> DecoderConfig {
    let base = match self.layout {
      LayoutKind::Separate => DecoderConfig {
        layout: OutputLayout::SeparateScoreAndBox {
          score_output: self.score_output.clone(),
          box_output: self.box_output.clone(),
        },
        ..DecoderConfig::default()
      },
      LayoutKind::Packed => DecoderConfig {
        layout: OutputLayout::PackedRow {
          output: self.packed_output.clone(),
        },
        ..DecoderConfig::packed_row()
      },
    };

    let base = match self.coordinate_space {
      Some(kind) => base.with_coordinate_space(kind.into()),
      None => base,
    };

    base
      .with_score_threshold(self.confidence)
      .with_row_stride(self.row_stride)
      .with_units(self.units.into())
  }

  pub fn nms_config(&self) -> NmsConfig {
    NmsConfig {
      iou_threshold: self.nms_threshold,
      class_agnostic: self.class_agnostic,
      max_detections: self.max_detections,
    }
  }
}
