// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/frame.rs - 图像帧与模型输入张量定义
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

use image::{RgbImage, imageops};

use crate::model::BBox;

pub const RGB_CHANNELS: usize = 3;

/// 像素内三个通道的排列顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

/// 三通道 8 位图像帧
///
/// 像素数据存放在 `RgbImage` 中，但通道含义由 `order` 决定，
/// 截屏类来源通常是 BGR。
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
  order: ChannelOrder,
}

impl Frame {
  pub fn new(image: RgbImage, order: ChannelOrder) -> Self {
    Self { image, order }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  pub fn order(&self) -> ChannelOrder {
    self.order
  }

  pub fn is_empty(&self) -> bool {
    self.image.width() == 0 || self.image.height() == 0
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  /// 转换到指定的通道顺序，顺序相同时仅复制
  pub fn to_order(&self, order: ChannelOrder) -> Frame {
    let mut image = self.image.clone();
    if order != self.order {
      for pixel in image.pixels_mut() {
        pixel.0.swap(0, 2);
      }
    }
    Frame { image, order }
  }

  /// 以真实 RGB 顺序导出图像，用于保存与绘制
  pub fn to_rgb_image(&self) -> RgbImage {
    self.to_order(ChannelOrder::Rgb).image
  }

  /// 按矩形裁剪，矩形先被限制在图像范围内；交集为空时返回 None
  pub fn crop(&self, rect: &BBox) -> Option<Frame> {
    let (width, height) = (self.width() as i32, self.height() as i32);
    let x1 = rect.x1.clamp(0, width);
    let y1 = rect.y1.clamp(0, height);
    let x2 = rect.x2.clamp(0, width);
    let y2 = rect.y2.clamp(0, height);

    if x2 <= x1 || y2 <= y1 {
      return None;
    }

    let image = imageops::crop_imm(
      &self.image,
      x1 as u32,
      y1 as u32,
      (x2 - x1) as u32,
      (y2 - y1) as u32,
    )
    .to_image();

    Some(Frame {
      image,
      order: self.order,
    })
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Frame::new(image, ChannelOrder::Rgb)
  }
}

/// NCHW 排列的浮点输入张量，批大小固定为 1
#[derive(Debug, Clone)]
pub struct InputTensor {
  data: Box<[f32]>,
  channels: usize,
  height: usize,
  width: usize,
}

impl InputTensor {
  pub fn with_shape(channels: usize, height: usize, width: usize) -> Self {
    let data = vec![0f32; channels * height * width].into_boxed_slice();
    Self {
      data,
      channels,
      height,
      width,
    }
  }

  /// `[batch, channels, height, width]`
  pub fn shape(&self) -> [usize; 4] {
    [1, self.channels, self.height, self.width]
  }
}

impl AsRef<[f32]> for InputTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

impl AsMut<[f32]> for InputTensor {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}
