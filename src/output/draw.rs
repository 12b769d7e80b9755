// 该文件是 Xifeng （西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{BoundingBox, DetectResult, Detection};

const BOX_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: u32 = 2;
// 没有字体时只画色块
const BLANK_TAB_HEIGHT: u32 = 6;
const BLANK_TAB_WIDTH: u32 = 24;
const LABEL_TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

// 按类别编号循环取色
const PALETTE: [[u8; 3]; 8] = [
  [0, 0, 255],
  [255, 56, 56],
  [72, 249, 10],
  [255, 157, 151],
  [0, 194, 255],
  [255, 178, 29],
  [146, 204, 23],
  [132, 56, 255],
];

static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  thickness: i32,
  palette: Vec<[u8; 3]>,
  font: Option<FontArc>,
  font_scale: PxScale,
}

impl Default for Draw {
  /// 使用内置字体；字体无法解析时退化为不带文字的色块
  fn default() -> Self {
    let font = FontArc::try_from_slice(DEFAULT_FONT)
      .map_err(|e| warn!("无法加载内置字体: {}", e))
      .ok();
    Self {
      thickness: BOX_THICKNESS,
      palette: PALETTE.to_vec(),
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }
}

impl Draw {
  /// 按 URI 中的 `font` 参数选择字体: 缺省为内置字体，`none` 不绘制文字，其他值视为字体文件路径
  pub fn from_font_query(font: Option<&str>) -> Result<Self, DrawError> {
    match font {
      None => Ok(Self::default()),
      Some("none") => Ok(Self::default().without_font()),
      Some(path) => Self::default().with_font_file(path),
    }
  }

  pub fn with_thickness(mut self, thickness: i32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    self.font = Some(FontArc::try_from_vec(data)?);
    info!("使用字体: {}", path.display());
    Ok(self)
  }

  pub fn without_font(mut self) -> Self {
    self.font = None;
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn color_of(&self, class_id: u32) -> Rgba<u8> {
    let [r, g, b] = self.palette[class_id as usize % self.palette.len()];
    Rgba([r, g, b, 255])
  }

  /// 标签色块的左上角与尺寸，色块优先放在边框上方
  fn label_rect(&self, image: &RgbaImage, x_min: i32, y_min: i32, label: &str) -> Rect {
    let (width, height) = match &self.font {
      Some(font) => {
        let (tw, th) = text_size(self.font_scale, font, label);
        (tw + 2 * LABEL_PADDING, th + 2 * LABEL_PADDING)
      }
      None => (BLANK_TAB_WIDTH, BLANK_TAB_HEIGHT),
    };
    let width = width.min(image.width() - x_min as u32).max(1);
    let y = (y_min - height as i32).max(0);
    Rect::at(x_min, y).of_size(width, height.max(1))
  }

  /// 在图像上绘制矩形边框和边框上方的标签，bbox 为图像像素坐标
  fn draw_bbox_with_label(
    &self,
    image: &mut RgbaImage,
    bbox: &BoundingBox,
    det: &Detection,
    color: Rgba<u8>,
  ) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox.x1.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y1.floor() as i32).clamp(0, h - 1);
    let x_max = (bbox.x2.ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox.y2.ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for t in 0..self.thickness {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = format!("{} {:.2}", det.class_name(), det.score());
    let tab = self.label_rect(image, x_min, y_min, &label);
    draw_filled_rect_mut(image, tab, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        tab.left() + LABEL_PADDING as i32,
        tab.top() + LABEL_PADDING as i32,
        self.font_scale,
        font,
        &label,
      );
    }
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbaImage, result: &DetectResult) {
    let (width, height) = image.dimensions();
    for det in result.items.iter() {
      let bbox = result.surface_box(det, width, height);
      self.draw_bbox_with_label(image, &bbox, det, self.color_of(det.class_id()));
    }
  }

  pub fn draw_detection(&self, frame: &RgbaImage, result: &DetectResult) -> RgbaImage {
    let mut image = frame.clone();
    self.draw_detections_on_image(&mut image, result);
    image
  }
}
