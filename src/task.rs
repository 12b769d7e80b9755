// 该文件是 Xifeng （西风） 项目的一部分。
// src/task.rs - 推理任务
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

use std::{thread, time::Duration};

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::{
  frame::{PixelBuffer, resize_to_target},
  model::{DetectResult, ModelInvoker},
  output::Render,
  pipeline::{DetectionPipeline, PipelineError},
};

/// 把流水线和模型会话绑在一起，对任意尺寸的帧做检测
pub struct FrameDetector<'p, M> {
  pipeline: &'p DetectionPipeline,
  invoker: M,
}

impl<'p, M: ModelInvoker> FrameDetector<'p, M> {
  pub fn new(pipeline: &'p DetectionPipeline, invoker: M) -> Self {
    Self { pipeline, invoker }
  }

  /// 先缩放到模型输入分辨率，再执行检测
  pub fn infer(&self, frame: &RgbaImage) -> Result<DetectResult, PipelineError> {
    let target = self.pipeline.target_size();
    let resized = resize_to_target(frame, target.width, target.height);
    let items = self
      .pipeline
      .detect(&PixelBuffer::from(&resized), &self.invoker)?;
    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::new(items, target))
  }
}

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(self, input: I, detector: D, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  'p,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbaImage>,
  M: ModelInvoker,
  O: Render<RgbaImage, DetectResult, Error = RE>,
> Task<I, FrameDetector<'p, M>, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    detector: FrameDetector<'p, M>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = detector.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

impl<
  'p,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbaImage>,
  M: ModelInvoker,
  O: Render<RgbaImage, DetectResult, Error = RE>,
> Task<I, FrameDetector<'p, M>, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    detector: FrameDetector<'p, M>,
    output: O,
  ) -> Result<(), Self::Error> {
    // 前两次视为预热
    const WARMUP: usize = 2;

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = std::time::Instant::now();
      let result = detector.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      info!("({})渲染完成，耗时: {:.2?}", i, now.elapsed());
      times.push(elapsed);
    }

    let measured = if times.len() > WARMUP {
      &times[WARMUP..]
    } else {
      &times[..]
    };
    warn!(
      "平均推理时间: {:.2?}",
      measured.iter().sum::<Duration>() / measured.len() as u32
    );

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<
  'p,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbaImage>,
  M: ModelInvoker,
  O: Render<RgbaImage, DetectResult, Error = RE>,
> Task<I, FrameDetector<'p, M>, O> for ContinuousTask
{
  type Error = anyhow::Error;

  /// 逐帧处理，上一帧的检测与渲染完成后才取下一帧
  fn run_task(self, input: I, detector: FrameDetector<'p, M>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .map_err(|e| anyhow::anyhow!("无法设置 Ctrl-C 处理函数: {}", e))?;

    let mut frame_index: usize = 0;
    let mut now = std::time::Instant::now();
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧图像", frame_index);
      let result = detector.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = std::time::Instant::now();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，退出");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{DEFAULT_BOX_OUTPUT, DEFAULT_SCORE_OUTPUT},
    tensor::{RawModelOutput, Tensor},
  };
  use image::Rgba;
  use std::cell::RefCell;

  struct Collect(RefCell<Vec<(u32, usize)>>);

  impl Render<RgbaImage, DetectResult> for &Collect {
    type Error = std::io::Error;

    fn render_result(&self, frame: &RgbaImage, result: &DetectResult) -> Result<(), Self::Error> {
      self.0.borrow_mut().push((frame.width(), result.len()));
      Ok(())
    }
  }

  fn invoker(input: Tensor) -> Result<RawModelOutput, std::io::Error> {
    assert_eq!(input.shape(), &[1, 3, 8, 8]);
    Ok(RawModelOutput::new(vec![
      Tensor::new(DEFAULT_SCORE_OUTPUT, vec![1], vec![0.9]).unwrap(),
      Tensor::new(
        DEFAULT_BOX_OUTPUT,
        vec![1, 6],
        vec![0.0, 0.0, 1.0, 1.0, 4.0, 4.0],
      )
      .unwrap(),
    ]))
  }

  fn pipeline() -> DetectionPipeline {
    DetectionPipeline::builder().target_size(8, 8).build()
  }

  #[test]
  fn frames_are_resized_before_detection() {
    let pipeline = pipeline();
    let detector = FrameDetector::new(&pipeline, invoker);
    let frame = RgbaImage::from_pixel(32, 16, Rgba([0, 0, 0, 255]));
    let result = detector.infer(&frame).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.tensor_size.width, 8);
    assert_eq!(result.items[0].class_name(), "person");
  }

  #[test]
  fn one_shot_renders_original_frame() {
    let pipeline = pipeline();
    let collect = Collect(RefCell::new(Vec::new()));
    let input = vec![RgbaImage::from_pixel(32, 16, Rgba([0, 0, 0, 255]))].into_iter();
    OneShotTask
      .run_task(input, FrameDetector::new(&pipeline, invoker), &collect)
      .unwrap();
    assert_eq!(collect.0.borrow().as_slice(), &[(32, 1)]);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let pipeline = pipeline();
    let collect = Collect(RefCell::new(Vec::new()));
    let input = Vec::<RgbaImage>::new().into_iter();
    assert!(
      OneShotTask
        .run_task(input, FrameDetector::new(&pipeline, invoker), &collect)
        .is_err()
    );
  }

  #[test]
  fn repeat_shot_runs_requested_times() {
    let pipeline = pipeline();
    let collect = Collect(RefCell::new(Vec::new()));
    let input = vec![RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]))].into_iter();
    RepeatShotTask::default()
      .with_repeat(2)
      .run_task(input, FrameDetector::new(&pipeline, invoker), &collect)
      .unwrap();
    assert_eq!(collect.0.borrow().len(), 2);
  }
}
