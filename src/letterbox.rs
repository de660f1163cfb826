// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/letterbox.rs - 等比缩放与居中填充
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

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};

/// 任意尺寸图像到模型输入画布之间的映射
///
/// 前导填充取 `pad / 2`（向下取整），奇数余量落在尾部，
/// 逆映射只依赖前导填充与缩放比例。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  scaled_width: u32,
  scaled_height: u32,
  target_width: u32,
  target_height: u32,
}

impl Letterbox {
  /// 计算映射参数，源尺寸或目标尺寸为零属于调用方错误
  pub fn new(src_width: u32, src_height: u32, target_width: u32, target_height: u32) -> Self {
    assert!(
      src_width > 0 && src_height > 0,
      "源图像尺寸不能为零: {}x{}",
      src_width,
      src_height
    );
    assert!(
      target_width > 0 && target_height > 0,
      "目标尺寸不能为零: {}x{}",
      target_width,
      target_height
    );

    let scale =
      (target_width as f32 / src_width as f32).min(target_height as f32 / src_height as f32);

    let scaled_width = ((src_width as f32 * scale).round() as u32).clamp(1, target_width);
    let scaled_height = ((src_height as f32 * scale).round() as u32).clamp(1, target_height);

    Self {
      scale,
      pad_x: (target_width - scaled_width) / 2,
      pad_y: (target_height - scaled_height) / 2,
      scaled_width,
      scaled_height,
      target_width,
      target_height,
    }
  }

  pub fn scaled_size(&self) -> (u32, u32) {
    (self.scaled_width, self.scaled_height)
  }

  pub fn target_size(&self) -> (u32, u32) {
    (self.target_width, self.target_height)
  }

  /// 右侧与下侧的填充量
  pub fn trailing_pad(&self) -> (u32, u32) {
    (
      self.target_width - self.scaled_width - self.pad_x,
      self.target_height - self.scaled_height - self.pad_y,
    )
  }

  /// 原图坐标 -> 模型输入坐标
  pub fn forward(&self, x: f32, y: f32) -> (f32, f32) {
    (
      x * self.scale + self.pad_x as f32,
      y * self.scale + self.pad_y as f32,
    )
  }

  /// 模型输入坐标 -> 原图坐标
  pub fn inverse(&self, x: f32, y: f32) -> (f32, f32) {
    (
      (x - self.pad_x as f32) / self.scale,
      (y - self.pad_y as f32) / self.scale,
    )
  }

  /// 缩放图像并贴到以 `fill` 填充的目标画布上
  pub fn apply(&self, image: &RgbImage, fill: [u8; 3]) -> RgbImage {
    let resized = if image.dimensions() == (self.scaled_width, self.scaled_height) {
      image.clone()
    } else {
      imageops::resize(
        image,
        self.scaled_width,
        self.scaled_height,
        FilterType::Triangle,
      )
    };

    let mut canvas = RgbImage::from_pixel(self.target_width, self.target_height, Rgb(fill));
    imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
    canvas
  }
}
