// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/output.rs - 输出定义
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

use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, board::AnalysisResult, frame::Frame, model::BBox};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// 未指定输出时什么也不做
impl<F, D, O: Render<F, D>> Render<F, D> for Option<O> {
  type Error = O::Error;

  fn render_result(&self, frame: &F, result: &D) -> Result<(), Self::Error> {
    match self {
      Some(output) => output.render_result(frame, result),
      None => Ok(()),
    }
  }
}

mod json_report;
pub use self::json_report::{JsonReportError, JsonReportOutput};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 报告输出错误: {0}")]
  JsonReportError(#[from] JsonReportError),
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  JsonReport(JsonReportOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFile(SaveImageFileOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonReportOutput::SCHEME => Ok(OutputWrapper::JsonReport(JsonReportOutput::from_url(url)?)),
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFile(
        SaveImageFileOutput::from_url(url)?,
      )),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<Frame, AnalysisResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &Frame, result: &AnalysisResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonReport(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

fn bbox_value(bbox: &BBox) -> Value {
  json!([bbox.x1, bbox.y1, bbox.x2, bbox.y2])
}

/// 把分析结果整理为 JSON
pub fn report(result: &AnalysisResult) -> Value {
  let pieces: Vec<Value> = result
    .pieces
    .iter()
    .map(|piece| {
      json!({
        "label": piece.label,
        "square": piece.square,
        "col": piece.grid_pos.col,
        "row": piece.grid_pos.row,
        "score": piece.score,
        "bbox": bbox_value(&piece.bbox),
      })
    })
    .collect();

  json!({
    "success": result.success(),
    "board_region": result.board_region.as_ref().map(bbox_value),
    "board_size": result.board_image.as_ref().map(|board| json!([board.width(), board.height()])),
    "pieces": pieces,
  })
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
    _ => Ok(()),
  }
}
