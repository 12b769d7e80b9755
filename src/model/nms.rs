// 该文件是 Xifeng （西风） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::model::{BoundingBox, Detection};

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsConfig {
  pub iou_threshold: f32,
  /// 为 true 时不区分类别，只按检测框抑制
  pub class_agnostic: bool,
  /// 抑制后最多保留的数量
  pub max_detections: Option<usize>,
}

impl Default for NmsConfig {
  fn default() -> Self {
    Self {
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      class_agnostic: false,
      max_detections: None,
    }
  }
}

impl NmsConfig {
  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }
}

/// 计算两个检测框的 IoU
///
/// 宽或高非正的框面积按 0 计；并集为 0 时 IoU 为 0。
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
  let x1 = a.x1.max(b.x1);
  let y1 = a.y1.max(b.y1);
  let x2 = a.x2.min(b.x2);
  let y2 = a.y2.min(b.y2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别分组的贪心 NMS，输出按分数降序
pub fn suppress(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  suppress_with(
    detections,
    &NmsConfig::default().with_iou_threshold(iou_threshold),
  )
}

pub fn suppress_with(detections: Vec<Detection>, config: &NmsConfig) -> Vec<Detection> {
  let total = detections.len();

  // 稳定排序，分数相同时保持解码顺序
  let mut order: Vec<usize> = (0..total).collect();
  order.sort_by(|&a, &b| detections[b].score().total_cmp(&detections[a].score()));

  let mut suppressed = vec![false; total];
  let mut kept = Vec::with_capacity(total);

  for (pos, &best) in order.iter().enumerate() {
    if suppressed[best] {
      continue;
    }
    kept.push(best);
    if config.max_detections.is_some_and(|max| kept.len() >= max) {
      break;
    }

    let best_det = &detections[best];
    for &other in &order[pos + 1..] {
      if suppressed[other] {
        continue;
      }
      let candidate = &detections[other];
      if !config.class_agnostic && candidate.class_id() != best_det.class_id() {
        continue;
      }
      if iou(best_det.bbox(), candidate.bbox()) > config.iou_threshold {
        suppressed[other] = true;
      }
    }
  }

  debug!("NMS: {} -> {} 个检测结果", total, kept.len());

  let mut slots: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
  kept
    .into_iter()
    .filter_map(|idx| slots[idx].take())
    .collect()
}
