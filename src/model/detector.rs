// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/model/detector.rs - 通用目标检测流程
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
use tracing::debug;
use url::Url;

use crate::{
  FromUrl,
  frame::{ChannelOrder, Frame},
  letterbox::Letterbox,
  model::{DetectResult, Inference, Model, codec, nms},
};

const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
const DEFAULT_PAD_COLOR: [u8; 3] = [114, 114, 114];

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("模型输入尺寸无效: {0}x{1}")]
  InvalidInputSize(u32, u32),
  #[error("置信度阈值必须在 (0, 1) 内, 实际为 {0}")]
  InvalidConfidenceThreshold(f32),
  #[error("NMS 阈值必须在 (0, 1) 内, 实际为 {0}")]
  InvalidNmsThreshold(f32),
  #[error("参数 {key} 的值无法解析: {value}")]
  InvalidQuery { key: String, value: String },
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("推理错误: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 单个检测模型的参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  pub input_width: u32,
  pub input_height: u32,
  pub confidence_threshold: f32,
  pub nms_threshold: f32,
  /// 填充色，按模型通道顺序给出
  pub pad_color: [u8; 3],
  /// 模型期望的通道顺序
  pub channel_order: ChannelOrder,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      input_width: DEFAULT_INPUT_SIZE,
      input_height: DEFAULT_INPUT_SIZE,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      pad_color: DEFAULT_PAD_COLOR,
      channel_order: ChannelOrder::Rgb,
    }
  }
}

impl DetectorConfig {
  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn pad_color(mut self, color: [u8; 3]) -> Self {
    self.pad_color = color;
    self
  }

  pub fn channel_order(mut self, order: ChannelOrder) -> Self {
    self.channel_order = order;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::InvalidInputSize(
        self.input_width,
        self.input_height,
      ));
    }
    if !(self.confidence_threshold > 0.0 && self.confidence_threshold < 1.0) {
      return Err(ConfigError::InvalidConfidenceThreshold(
        self.confidence_threshold,
      ));
    }
    if !(self.nms_threshold > 0.0 && self.nms_threshold < 1.0) {
      return Err(ConfigError::InvalidNmsThreshold(self.nms_threshold));
    }
    Ok(())
  }
}

fn parse_query<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.parse().map_err(|_| ConfigError::InvalidQuery {
    key: key.to_string(),
    value: value.to_string(),
  })
}

/// 只读取查询参数，不关心 scheme 与路径:
/// `width`、`height`、`confidence`、`nms`、`order` (rgb/bgr)
impl FromUrl for DetectorConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut config = DetectorConfig::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "width" => config.input_width = parse_query(&key, &value)?,
        "height" => config.input_height = parse_query(&key, &value)?,
        "confidence" => config.confidence_threshold = parse_query(&key, &value)?,
        "nms" => config.nms_threshold = parse_query(&key, &value)?,
        "order" => {
          config.channel_order = match value.as_ref() {
            "rgb" => ChannelOrder::Rgb,
            "bgr" => ChannelOrder::Bgr,
            _ => {
              return Err(ConfigError::InvalidQuery {
                key: key.to_string(),
                value: value.to_string(),
              });
            }
          }
        }
        _ => debug!("忽略未知参数: {}={}", key, value),
      }
    }
    config.validate()?;
    Ok(config)
  }
}

/// 检测流程：letterbox -> 编码 -> 推理 -> 解码 -> NMS
///
/// 棋盘与棋子使用同一类型，仅参数与推理后端不同。
pub struct Detector<I> {
  engine: I,
  config: DetectorConfig,
}

impl<I: Inference> Detector<I> {
  pub fn new(engine: I, config: DetectorConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self { engine, config })
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn engine(&self) -> &I {
    &self.engine
  }

  /// 检测一帧图像，结果按 NMS 保留顺序排列，坐标为原图像素
  pub fn detect(&self, frame: &Frame) -> Result<DetectResult, DetectorError> {
    let config = &self.config;
    let letterbox = Letterbox::new(
      frame.width(),
      frame.height(),
      config.input_width,
      config.input_height,
    );
    debug!(
      "letterbox: {}x{} -> {}x{}, scale={:.4}, pad=({}, {})",
      frame.width(),
      frame.height(),
      config.input_width,
      config.input_height,
      letterbox.scale,
      letterbox.pad_x,
      letterbox.pad_y
    );

    let tensor = codec::encode(frame, &letterbox, config.pad_color, config.channel_order);

    let output = self
      .engine
      .run(&tensor)
      .map_err(|e| DetectorError::Inference(Box::new(e)))?;
    debug!("模型输出形状: {:?}", output.shape);

    let candidates = codec::decode(&output, &letterbox, config.confidence_threshold);
    if candidates.is_empty() {
      return Ok(DetectResult::default());
    }

    let items = nms::suppress_items(candidates, config.nms_threshold);
    debug!("NMS 后保留 {} 个目标", items.len());
    Ok(items.into())
  }
}

impl<I: Inference> Model for Detector<I> {
  type Input = Frame;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.detect(input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::InputTensor,
    model::{BBox, RawOutput},
  };
  use image::RgbImage;
  use std::cell::Cell;

  #[derive(Error, Debug)]
  #[error("推理失败")]
  struct Failure;

  struct Scripted {
    output: Option<RawOutput>,
    seen: Cell<Option<[usize; 4]>>,
  }

  impl Scripted {
    fn returning(preds: &[[f32; 5]]) -> Self {
      let n = preds.len();
      let mut data = vec![0f32; 5 * n];
      for (i, pred) in preds.iter().enumerate() {
        for (a, value) in pred.iter().enumerate() {
          data[a * n + i] = *value;
        }
      }
      Self {
        output: Some(RawOutput::new(data, vec![1, 5, n as i64])),
        seen: Cell::new(None),
      }
    }

    fn failing() -> Self {
      Self {
        output: None,
        seen: Cell::new(None),
      }
    }
  }

  impl Inference for Scripted {
    type Error = Failure;

    fn run(&self, input: &InputTensor) -> Result<RawOutput, Self::Error> {
      self.seen.set(Some(input.shape()));
      self.output.clone().ok_or(Failure)
    }
  }

  fn frame(width: u32, height: u32) -> Frame {
    Frame::from(RgbImage::new(width, height))
  }

  #[test]
  fn detections_are_in_source_coordinates() {
    let engine = Scripted::returning(&[[320.0, 320.0, 100.0, 50.0, 0.9]]);
    let detector = Detector::new(engine, DetectorConfig::default()).unwrap();
    let result = detector.detect(&frame(1280, 720)).unwrap();

    assert_eq!(detector.engine().seen.get(), Some([1, 3, 640, 640]));
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].bbox, BBox::new(540, 310, 740, 410));
  }

  #[test]
  fn duplicates_are_suppressed() {
    let engine = Scripted::returning(&[
      [100.0, 100.0, 40.0, 40.0, 0.8],
      [300.0, 300.0, 40.0, 40.0, 0.7],
      [101.0, 101.0, 40.0, 40.0, 0.95],
    ]);
    let detector = Detector::new(engine, DetectorConfig::default()).unwrap();
    let result = detector.detect(&frame(640, 640)).unwrap();
    let scores: Vec<f32> = result.iter().map(|item| item.score).collect();
    assert_eq!(scores, vec![0.95, 0.7]);
  }

  #[test]
  fn nothing_above_threshold_is_empty() {
    let engine = Scripted::returning(&[[100.0, 100.0, 40.0, 40.0, 0.2]]);
    let detector = Detector::new(engine, DetectorConfig::default()).unwrap();
    assert!(detector.detect(&frame(64, 48)).unwrap().is_empty());
  }

  #[test]
  fn inference_failure_is_reported() {
    let detector = Detector::new(Scripted::failing(), DetectorConfig::default()).unwrap();
    assert!(matches!(
      detector.detect(&frame(10, 10)),
      Err(DetectorError::Inference(_))
    ));
  }

  #[test]
  fn invalid_thresholds_are_rejected() {
    let config = DetectorConfig::default().confidence_threshold(1.0);
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidConfidenceThreshold(_))
    ));
    let config = DetectorConfig::default().nms_threshold(0.0);
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidNmsThreshold(_))
    ));
    let config = DetectorConfig::default().input_size(0, 640);
    assert!(Detector::new(Scripted::failing(), config).is_err());
  }

  #[test]
  fn config_from_url_query() {
    let url = Url::parse("onnx:///models/board.onnx?width=416&height=320&confidence=0.25&nms=0.6&order=bgr")
      .unwrap();
    let config = DetectorConfig::from_url(&url).unwrap();
    assert_eq!((config.input_width, config.input_height), (416, 320));
    assert_eq!(config.confidence_threshold, 0.25);
    assert_eq!(config.nms_threshold, 0.6);
    assert_eq!(config.channel_order, ChannelOrder::Bgr);

    let bad = Url::parse("onnx:///m.onnx?width=abc").unwrap();
    assert!(matches!(
      DetectorConfig::from_url(&bad),
      Err(ConfigError::InvalidQuery { .. })
    ));
  }
}
