// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/bin/simple.rs - 单张图像棋盘识别
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use qipan::{
  BoardAnalyzer, FromUrl, LabelTable,
  input::ImageFileInput,
  model::onnx::OnnxDetectorBuilder,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};

/// Qipan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 棋盘检测模型，如 onnx:///models/board.onnx?confidence=0.5
  #[arg(long, value_name = "MODEL")]
  pub board_model: Url,
  /// 棋子检测模型
  #[arg(long, value_name = "MODEL")]
  pub piece_model: Url,
  /// 输入图像，如 image:///data/board.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，json:///out/report.json 或 image:///out/board.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 棋子类别标签文件 (JSON 字符串数组)
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("棋盘模型: {}", args.board_model);
  info!("棋子模型: {}", args.piece_model);
  info!("输入来源: {}", args.input);

  let labels = match &args.labels {
    Some(path) => LabelTable::from_json_file(path)?,
    None => LabelTable::default(),
  };
  info!("棋子类别数: {}", labels.len());

  let input = ImageFileInput::from_url(&args.input)?;
  let board = OnnxDetectorBuilder::from_url(&args.board_model)?.build()?;
  let pieces = OnnxDetectorBuilder::from_url(&args.piece_model)?.build()?;
  let analyzer = BoardAnalyzer::new(board, pieces, labels);
  let output = args.output.as_ref().map(OutputWrapper::from_url).transpose()?;

  let result = OneShotTask.run_task(input, analyzer, output)?;
  if !result.success() {
    warn!("未检测到棋盘");
    return Ok(());
  }

  for piece in &result.pieces {
    println!("{} {} {:.3}", piece.square, piece.label, piece.score);
  }
  for (row, squares) in result.grid().iter().enumerate() {
    let line: Vec<&str> = squares.iter().map(|s| s.unwrap_or("..")).collect();
    println!("{} {}", 8 - row, line.join(" "));
  }

  Ok(())
}
