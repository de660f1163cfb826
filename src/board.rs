// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/board.rs - 棋盘定位与棋子落位
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

use std::{convert::Infallible, fmt, path::Path};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::Frame,
  model::{BBox, DetectItem, DetectResult, Detector, Inference, Model},
};

/// 棋盘每边的格数
pub const BOARD_SQUARES: u8 = 8;

/// 默认标签表：白方六种棋子，随后是黑方六种，
/// 顺序为兵、马、象、车、后、王
pub const CHESS_LABELS: [&str; 12] = [
  "wp", "wn", "wb", "wr", "wq", "wk", "bp", "bn", "bb", "br", "bq", "bk",
];

#[derive(Error, Debug)]
pub enum LabelTableError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("标签表为空")]
  Empty,
}

/// 类别编号到棋子名称的有序映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  labels: Box<[String]>,
}

impl Default for LabelTable {
  fn default() -> Self {
    Self::new(CHESS_LABELS)
  }
}

impl LabelTable {
  pub fn new<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  /// 从 JSON 字符串数组读取，例如 `["wp", "wn", ...]`
  pub fn from_json_str(text: &str) -> Result<Self, LabelTableError> {
    let labels: Vec<String> = serde_json::from_str(text)?;
    if labels.is_empty() {
      return Err(LabelTableError::Empty);
    }
    Ok(Self::new(labels))
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LabelTableError> {
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn get(&self, class_id: u32) -> Option<&str> {
    self.labels.get(class_id as usize).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

/// 8x8 网格上的位置，row 0 为第 8 横排，col 0 为 a 列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPos {
  pub col: u8,
  pub row: u8,
}

impl GridPos {
  /// 把棋盘图像内的中心点量化到格子上，越界的点被钳制到边缘格
  pub fn from_centroid(x: f32, y: f32, board_width: u32, board_height: u32) -> Self {
    // 棋盘小于 8 像素时格宽按 1 计
    let square_w = (board_width / BOARD_SQUARES as u32).max(1) as f32;
    let square_h = (board_height / BOARD_SQUARES as u32).max(1) as f32;
    let last = (BOARD_SQUARES - 1) as f32;

    Self {
      col: (x / square_w).floor().clamp(0.0, last) as u8,
      row: (y / square_h).floor().clamp(0.0, last) as u8,
    }
  }

  pub fn file(&self) -> char {
    (b'a' + self.col) as char
  }

  pub fn rank(&self) -> char {
    (b'8' - self.row) as char
  }

  /// 代数记谱法格名，例如 "e4"
  pub fn notation(&self) -> String {
    format!("{}{}", self.file(), self.rank())
  }
}

impl fmt::Display for GridPos {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", self.file(), self.rank())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieceInfo {
  pub label: String,
  pub square: String,
  pub grid_pos: GridPos,
  pub score: f32,
  /// 棋盘图像内的像素坐标
  pub bbox: BBox,
}

/// 一次分析的结果
///
/// `board_image` 为 None 表示没有找到棋盘，此时 `pieces` 一定为空。
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
  pub board_image: Option<Frame>,
  /// 棋盘在原图中的位置（已钳制到图像范围内）
  pub board_region: Option<BBox>,
  pub pieces: Vec<PieceInfo>,
}

impl AnalysisResult {
  pub fn success(&self) -> bool {
    self.board_image.is_some()
  }

  /// 以 `[row][col]` 排列的棋子标签，同一格上后出现的棋子覆盖先出现的
  pub fn grid(&self) -> [[Option<&str>; 8]; 8] {
    let mut grid = [[None; 8]; 8];
    for piece in &self.pieces {
      grid[piece.grid_pos.row as usize][piece.grid_pos.col as usize] = Some(piece.label.as_str());
    }
    grid
  }
}

/// 面积最大的检测框，面积相同时取先出现的；全为空框时返回 None
pub fn largest_detection(result: &DetectResult) -> Option<&DetectItem> {
  let mut best = None;
  let mut best_area = 0;
  for item in result.iter() {
    let area = item.bbox.area();
    if area > best_area {
      best_area = area;
      best = Some(item);
    }
  }
  best
}

/// 把棋盘图像内的一个检测结果落到格子上，类别超出标签表时返回 None
pub fn locate_piece(
  item: &DetectItem,
  labels: &LabelTable,
  board_width: u32,
  board_height: u32,
) -> Option<PieceInfo> {
  let label = labels.get(item.class_id)?;
  // 中心点先取整到像素，半像素向偶数取整
  let (cx, cy) = item.bbox.center();
  let grid_pos = GridPos::from_centroid(
    cx.round_ties_even(),
    cy.round_ties_even(),
    board_width,
    board_height,
  );

  Some(PieceInfo {
    label: label.to_string(),
    square: grid_pos.notation(),
    grid_pos,
    score: item.score,
    bbox: item.bbox,
  })
}

/// 先找棋盘再找棋子
///
/// 两个检测器共享同一套流程，各自持有推理后端与阈值。
pub struct BoardAnalyzer<B, P> {
  board: Detector<B>,
  pieces: Detector<P>,
  labels: LabelTable,
}

impl<B: Inference, P: Inference> BoardAnalyzer<B, P> {
  pub fn new(board: Detector<B>, pieces: Detector<P>, labels: LabelTable) -> Self {
    Self {
      board,
      pieces,
      labels,
    }
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn board(&self) -> &Detector<B> {
    &self.board
  }

  pub fn pieces(&self) -> &Detector<P> {
    &self.pieces
  }

  /// 分析一帧图像，不会返回错误
  ///
  /// 推理失败按“没有检测到”处理，空图像同样得到空结果。
  pub fn analyze(&self, frame: &Frame) -> AnalysisResult {
    if frame.is_empty() {
      warn!("输入图像尺寸为零: {:?}", frame.dimensions());
      return AnalysisResult::default();
    }

    let Some((region, board_image)) = self.detect_board(frame) else {
      return AnalysisResult::default();
    };

    let pieces = self.detect_pieces(&board_image);
    info!("棋盘 {:?} 上识别到 {} 个棋子", region, pieces.len());

    AnalysisResult {
      board_image: Some(board_image),
      board_region: Some(region),
      pieces,
    }
  }

  fn detect_board(&self, frame: &Frame) -> Option<(BBox, Frame)> {
    let detections = match self.board.detect(frame) {
      Ok(detections) => detections,
      Err(e) => {
        error!("棋盘检测失败: {}", e);
        return None;
      }
    };

    if detections.is_empty() {
      info!("未检测到棋盘");
      return None;
    }

    let Some(largest) = largest_detection(&detections) else {
      warn!("棋盘检测框面积均为零");
      return None;
    };
    debug!(
      "选取面积最大的棋盘框: {:?}, 得分 {:.3}",
      largest.bbox, largest.score
    );

    let bounds = BBox::new(0, 0, frame.width() as i32, frame.height() as i32);
    let region = largest.bbox.intersection(&bounds);
    let board_image = frame.crop(&largest.bbox);

    match (region, board_image) {
      (Some(region), Some(board_image)) => Some((region, board_image)),
      _ => {
        warn!("棋盘框 {:?} 在图像范围之外", largest.bbox);
        None
      }
    }
  }

  fn detect_pieces(&self, board: &Frame) -> Vec<PieceInfo> {
    let detections = match self.pieces.detect(board) {
      Ok(detections) => detections,
      Err(e) => {
        error!("棋子检测失败: {}", e);
        return Vec::new();
      }
    };

    let (width, height) = board.dimensions();
    detections
      .iter()
      .filter_map(|item| {
        let piece = locate_piece(item, &self.labels, width, height);
        if piece.is_none() {
          warn!(
            "类别编号 {} 超出标签表范围 ({}), 丢弃该检测",
            item.class_id,
            self.labels.len()
          );
        }
        piece
      })
      .collect()
  }
}

impl<B: Inference, P: Inference> Model for BoardAnalyzer<B, P> {
  type Input = Frame;
  type Output = AnalysisResult;
  type Error = Infallible;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Ok(self.analyze(input))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, bbox: BBox) -> DetectItem {
    DetectItem {
      class_id,
      score: 0.9,
      bbox,
    }
  }

  #[test]
  fn square_boundary_maps_to_e4() {
    let pos = GridPos::from_centroid(400.0, 400.0, 800, 800);
    assert_eq!(pos, GridPos { col: 4, row: 4 });
    assert_eq!(pos.notation(), "e4");
  }

  #[test]
  fn corners_map_to_a8_and_h1() {
    assert_eq!(GridPos::from_centroid(0.0, 0.0, 800, 800).notation(), "a8");
    assert_eq!(GridPos::from_centroid(799.0, 799.0, 800, 800).notation(), "h1");
  }

  #[test]
  fn centroids_on_or_past_the_edge_are_clamped() {
    let (w, h) = (803u32, 797u32);
    let mut y = -3.0f32;
    while y <= h as f32 + 3.0 {
      let mut x = -3.0f32;
      while x <= w as f32 + 3.0 {
        let pos = GridPos::from_centroid(x, y, w, h);
        assert!(pos.col < 8 && pos.row < 8);
        x += 0.5;
      }
      y += 7.25;
    }
    assert_eq!(
      GridPos::from_centroid(w as f32, h as f32, w, h),
      GridPos { col: 7, row: 7 }
    );
  }

  #[test]
  fn tiny_board_does_not_divide_by_zero() {
    let pos = GridPos::from_centroid(3.0, 5.0, 4, 6);
    assert_eq!(pos, GridPos { col: 3, row: 5 });
  }

  #[test]
  fn first_black_label_is_black_pawn() {
    let labels = LabelTable::default();
    assert_eq!(labels.len(), 12);
    assert_eq!(labels.get(6), Some("bp"));
    assert_eq!(labels.get(0), Some("wp"));
    assert_eq!(labels.get(11), Some("bk"));
    assert_eq!(labels.get(12), None);
  }

  #[test]
  fn labels_from_json() {
    let labels = LabelTable::from_json_str(r#"["board", "piece"]"#).unwrap();
    assert_eq!(labels.get(1), Some("piece"));
    assert!(matches!(
      LabelTable::from_json_str("[]"),
      Err(LabelTableError::Empty)
    ));
    assert!(matches!(
      LabelTable::from_json_str("{"),
      Err(LabelTableError::JsonError(_))
    ));
  }

  #[test]
  fn largest_detection_prefers_first_on_ties() {
    let result = DetectResult::from(vec![
      item(0, BBox::new(0, 0, 10, 10)),
      item(1, BBox::new(0, 0, 20, 5)),
      item(2, BBox::new(50, 50, 60, 60)),
      item(3, BBox::new(0, 0, 5, 5)),
    ]);
    assert_eq!(largest_detection(&result).map(|item| item.class_id), Some(0));
    assert!(largest_detection(&DetectResult::default()).is_none());
    let flat = DetectResult::from(vec![item(0, BBox::new(4, 4, 4, 20))]);
    assert!(largest_detection(&flat).is_none());
  }

  #[test]
  fn pieces_outside_label_table_are_dropped() {
    let labels = LabelTable::default();
    assert!(locate_piece(&item(12, BBox::new(0, 0, 10, 10)), &labels, 80, 80).is_none());

    let piece = locate_piece(&item(6, BBox::new(350, 350, 450, 450)), &labels, 800, 800).unwrap();
    assert_eq!(piece.label, "bp");
    assert_eq!(piece.square, "e4");
  }

  #[test]
  fn half_pixel_centroids_round_to_even() {
    let labels = LabelTable::default();
    let place = |bbox| locate_piece(&item(0, bbox), &labels, 800, 800).unwrap().square;

    // 99.5 -> 100，正好落在第二格的起点
    assert_eq!(place(BBox::new(0, 0, 199, 199)), "b7");
    // 98.5 -> 98
    assert_eq!(place(BBox::new(0, 0, 197, 197)), "a8");
    // 100.5 -> 100
    assert_eq!(place(BBox::new(0, 0, 201, 201)), "b7");
    assert_eq!(place(BBox::new(0, 0, 200, 199)), "b7");
  }

  #[test]
  fn grid_places_labels_by_row_and_col() {
    let labels = LabelTable::default();
    let pieces = vec![
      locate_piece(&item(5, BBox::new(400, 700, 500, 800)), &labels, 800, 800).unwrap(),
      locate_piece(&item(11, BBox::new(400, 0, 500, 100)), &labels, 800, 800).unwrap(),
    ];
    let result = AnalysisResult {
      board_image: None,
      board_region: None,
      pieces,
    };
    let grid = result.grid();
    assert_eq!(grid[7][4], Some("wk"));
    assert_eq!(grid[0][4], Some("bk"));
    assert_eq!(grid[3][3], None);
  }
}
