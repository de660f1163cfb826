// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/model.rs - 模型
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

use crate::frame::InputTensor;

pub mod codec;
pub mod detector;
pub mod nms;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use self::codec::RawOutput;
pub use self::detector::{ConfigError, Detector, DetectorConfig, DetectorError};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 推理运行时
///
/// 输入固定为 `[1, C, H, W]` 的浮点张量；输出的形状必须来自运行时的
/// 输出元数据，而不是根据缓冲区长度推断。
pub trait Inference {
  type Error: std::error::Error + Send + Sync + 'static;

  fn run(&self, input: &InputTensor) -> Result<RawOutput, Self::Error>;
}

impl<T: Inference + ?Sized> Inference for &T {
  type Error = T::Error;

  fn run(&self, input: &InputTensor) -> Result<RawOutput, Self::Error> {
    (**self).run(input)
  }
}

/// 原图像素坐标下的轴对齐矩形，`(x1, y1)` 为左上角，`(x2, y2)` 为右下角
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BBox {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl BBox {
  /// 由两个角点构造，角点顺序会被规整
  pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
    Self {
      x1: x1.min(x2),
      y1: y1.min(y2),
      x2: x1.max(x2),
      y2: y1.max(y2),
    }
  }

  pub fn width(&self) -> i32 {
    self.x2.saturating_sub(self.x1)
  }

  pub fn height(&self) -> i32 {
    self.y2.saturating_sub(self.y1)
  }

  pub fn area(&self) -> i64 {
    (self.x2 as i64 - self.x1 as i64).saturating_mul(self.y2 as i64 - self.y1 as i64)
  }

  pub fn center(&self) -> (f32, f32) {
    (
      ((self.x1 as i64 + self.x2 as i64) as f64 / 2.0) as f32,
      ((self.y1 as i64 + self.y2 as i64) as f64 / 2.0) as f32,
    )
  }

  pub fn intersection(&self, other: &BBox) -> Option<BBox> {
    let x1 = self.x1.max(other.x1);
    let y1 = self.y1.max(other.y1);
    let x2 = self.x2.min(other.x2);
    let y2 = self.y2.min(other.y2);
    if x2 > x1 && y2 > y1 {
      Some(BBox { x1, y1, x2, y2 })
    } else {
      None
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: BBox,
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}
