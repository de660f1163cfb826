// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  board::AnalysisResult,
  frame::Frame,
  model::BBox,
  output::{Render, ensure_parent},
};

const BOARD_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const WHITE_PIECE_COLOR: [u8; 3] = [255, 160, 0];
const BLACK_PIECE_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const LINE_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 在原图上画出棋盘与棋子框后保存
pub struct SaveImageFileOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(url.path()),
    })
  }
}

// 画一个加粗的空心矩形，空矩形直接跳过
fn draw_bbox(image: &mut RgbImage, bbox: &BBox, color: [u8; 3]) {
  for t in 0..LINE_THICKNESS {
    let width = bbox.width() - 2 * t;
    let height = bbox.height() - 2 * t;
    if width <= 0 || height <= 0 {
      return;
    }
    let rect = Rect::at(bbox.x1 + t, bbox.y1 + t).of_size(width as u32, height as u32);
    draw_hollow_rect_mut(image, rect, Rgb(color));
  }
}

/// 标注后的 RGB 图像；棋子框从棋盘坐标平移回原图坐标
pub fn annotate(frame: &Frame, result: &AnalysisResult) -> RgbImage {
  let mut image = frame.to_rgb_image();

  let Some(region) = result.board_region else {
    return image;
  };
  draw_bbox(&mut image, &region, BOARD_COLOR);

  for piece in &result.pieces {
    let bbox = BBox::new(
      piece.bbox.x1 + region.x1,
      piece.bbox.y1 + region.y1,
      piece.bbox.x2 + region.x1,
      piece.bbox.y2 + region.y1,
    );
    let color = if piece.label.starts_with('w') {
      WHITE_PIECE_COLOR
    } else {
      BLACK_PIECE_COLOR
    };
    draw_bbox(&mut image, &bbox, color);
  }

  image
}

impl Render<Frame, AnalysisResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &AnalysisResult) -> Result<(), Self::Error> {
    if !result.success() {
      warn!("未检测到棋盘，保存原始图像");
    }

    ensure_parent(&self.path)?;
    annotate(frame, result).save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn board_and_pieces_are_outlined() {
    let frame = Frame::from(RgbImage::new(100, 100));
    let result = AnalysisResult {
      board_image: Some(Frame::from(RgbImage::new(80, 80))),
      board_region: Some(BBox::new(10, 10, 90, 90)),
      pieces: vec![crate::board::PieceInfo {
        label: "bk".to_string(),
        square: "a8".to_string(),
        grid_pos: crate::board::GridPos { col: 0, row: 0 },
        score: 0.9,
        bbox: BBox::new(5, 5, 15, 15),
      }],
    };

    let image = annotate(&frame, &result);
    assert_eq!(image.get_pixel(10, 50).0, BOARD_COLOR);
    assert_eq!(image.get_pixel(15, 20).0, BLACK_PIECE_COLOR);
    assert_eq!(image.get_pixel(50, 50).0, [0, 0, 0]);
  }

  #[test]
  fn saves_original_when_no_board() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotated.png");
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let frame = Frame::from(RgbImage::new(20, 10));
    output
      .render_result(&frame, &AnalysisResult::default())
      .unwrap();
    let saved = image::open(&path).unwrap();
    assert_eq!((saved.width(), saved.height()), (20, 10));
  }
}
