// 该文件是 Xifeng （西风） 项目的一部分。
// tests/end_to_end.rs - 端到端检测流程
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

use std::io::Write;

use xifeng::{
  DetectionPipeline, FromUrl, LabelTable, PixelBuffer, RawModelOutput, TargetSize, Tensor,
  TensorCodec,
  model::{
    BoundingBox, DEFAULT_BOX_OUTPUT, DEFAULT_SCORE_OUTPUT, DecoderConfig, ReplayError,
    ReplayInvoker, decode, suppress,
  },
  pipeline::ErrorKind,
};

fn red_2x2() -> Vec<u8> {
  [255u8, 0, 0, 255].repeat(4)
}

fn single_row_output() -> RawModelOutput {
  RawModelOutput::new(vec![
    Tensor::new(DEFAULT_SCORE_OUTPUT, vec![1], vec![0.9]).unwrap(),
    Tensor::new(
      DEFAULT_BOX_OUTPUT,
      vec![1, 6],
      vec![0.0, 0.0, 10.0, 10.0, 50.0, 50.0],
    )
    .unwrap(),
  ])
}

#[test]
fn encode_decode_and_suppress_a_red_frame() {
  let pixels = red_2x2();
  let buffer = PixelBuffer::new(2, 2, &pixels).unwrap();
  let tensor = TensorCodec::default().encode(&buffer, 2, 2).unwrap();
  assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
  assert_eq!(tensor.data()[..4], [1.0; 4]);
  assert_eq!(tensor.data()[4..], [0.0; 8]);

  let labels = LabelTable::coco();
  let output = single_row_output();

  let kept = decode(&output, &labels, &DecoderConfig::default()).unwrap();
  assert_eq!(kept.len(), 1);
  assert_eq!(kept[0].class_id(), 0);
  assert_eq!(kept[0].class_name(), "person");
  assert!((kept[0].score() - 0.9).abs() < 1e-6);
  assert_eq!(
    *kept[0].bbox(),
    BoundingBox::from_corners(10.0, 10.0, 50.0, 50.0)
  );
  assert_eq!(suppress(kept.clone(), 0.5), kept);

  let strict = DecoderConfig::default().with_score_threshold(0.95);
  assert!(decode(&output, &labels, &strict).unwrap().is_empty());
}

#[test]
fn replayed_session_drives_the_pipeline() {
  let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
  let recording = serde_json::json!({
    "input_shape": [1, 3, 2, 2],
    "outputs": single_row_output(),
  });
  write!(file, "{}", recording).unwrap();

  let url = url::Url::parse(&format!("replay://{}", file.path().display())).unwrap();
  let invoker = ReplayInvoker::from_url(&url).unwrap();

  let pixels = red_2x2();
  let buffer = PixelBuffer::new(2, 2, &pixels).unwrap();
  let pipeline = DetectionPipeline::builder().target_size(2, 2).build();
  let items = pipeline.detect(&buffer, &invoker).unwrap();
  assert_eq!(items.len(), 1);
  assert_eq!(items[0].class_name(), "person");

  // 录制时的输入是 2x2，换成 4x4 的会话调用应当报错
  let pixels = vec![0u8; 4 * 4 * 4];
  let buffer = PixelBuffer::new(4, 4, &pixels).unwrap();
  let err = DetectionPipeline::builder()
    .target_size(4, 4)
    .build()
    .detect(&buffer, &invoker)
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::ModelInvocationError);
  match err {
    xifeng::PipelineError::ModelInvocation(inner) => assert!(matches!(
      inner.downcast_ref::<ReplayError>(),
      Some(ReplayError::InputShapeMismatch { .. })
    )),
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn free_detect_matches_the_pipeline() {
  let pixels = red_2x2();
  let buffer = PixelBuffer::new(2, 2, &pixels).unwrap();
  let invoker = |_: Tensor| -> Result<RawModelOutput, std::io::Error> { Ok(single_row_output()) };

  let items = xifeng::detect(
    &buffer,
    TargetSize::new(2, 2),
    &invoker,
    &LabelTable::coco(),
    &DecoderConfig::default(),
    0.5,
  )
  .unwrap();
  assert_eq!(items.len(), 1);

  let err = xifeng::detect(
    &buffer,
    TargetSize::new(3, 3),
    &invoker,
    &LabelTable::coco(),
    &DecoderConfig::default(),
    0.5,
  )
  .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
}

#[test]
fn schema_errors_are_reported() {
  let pixels = red_2x2();
  let buffer = PixelBuffer::new(2, 2, &pixels).unwrap();
  let invoker = |_: Tensor| -> Result<RawModelOutput, std::io::Error> {
    Ok(RawModelOutput::new(vec![
      Tensor::new(DEFAULT_SCORE_OUTPUT, vec![2], vec![0.9, 0.8]).unwrap(),
      Tensor::new(DEFAULT_BOX_OUTPUT, vec![1, 6], vec![0.0; 6]).unwrap(),
    ]))
  };
  let err = DetectionPipeline::builder()
    .target_size(2, 2)
    .build()
    .detect(&buffer, &invoker)
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidOutputSchema);
}
