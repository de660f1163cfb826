// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/output/json_report.rs - JSON 报告输出
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

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  board::AnalysisResult,
  frame::Frame,
  output::{Render, ensure_parent, report},
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub struct JsonReportOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(JsonReportOutput {
      path: PathBuf::from(url.path()),
    })
  }
}

impl Render<Frame, AnalysisResult> for JsonReportOutput {
  type Error = JsonReportError;

  fn render_result(&self, _frame: &Frame, result: &AnalysisResult) -> Result<(), Self::Error> {
    ensure_parent(&self.path)?;
    let text = serde_json::to_string_pretty(&report(result))?;
    std::fs::write(&self.path, text)?;
    info!("保存分析结果到文件: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    board::{GridPos, PieceInfo},
    model::BBox,
  };
  use image::RgbImage;
  use serde_json::Value;

  #[test]
  fn writes_pieces_and_board_region() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("report.json");
    let url = Url::parse(&format!("json://{}", path.display())).unwrap();
    let output = JsonReportOutput::from_url(&url).unwrap();

    let result = AnalysisResult {
      board_image: Some(Frame::from(RgbImage::new(80, 80))),
      board_region: Some(BBox::new(10, 20, 90, 100)),
      pieces: vec![PieceInfo {
        label: "wq".to_string(),
        square: "d1".to_string(),
        grid_pos: GridPos { col: 3, row: 7 },
        score: 0.75,
        bbox: BBox::new(30, 70, 40, 80),
      }],
    };
    output
      .render_result(&Frame::from(RgbImage::new(100, 100)), &result)
      .unwrap();

    let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["success"], Value::Bool(true));
    assert_eq!(value["board_region"], serde_json::json!([10, 20, 90, 100]));
    assert_eq!(value["board_size"], serde_json::json!([80, 80]));
    assert_eq!(value["pieces"][0]["square"], "d1");
    assert_eq!(value["pieces"][0]["row"], 7);
  }

  #[test]
  fn missing_board_is_reported_as_null() {
    let value = report(&AnalysisResult::default());
    assert_eq!(value["success"], Value::Bool(false));
    assert!(value["board_region"].is_null());
    assert_eq!(value["pieces"], serde_json::json!([]));
  }
}
