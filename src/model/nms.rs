// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use crate::model::{BBox, DetectItem};

/// 计算两个边界框的 IoU，并集面积为零时返回 0
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let intersection = a.intersection(b).map_or(0, |rect| rect.area());
  let union = a.area() + b.area() - intersection;

  if union > 0 {
    intersection as f32 / union as f32
  } else {
    0.0
  }
}

/// 贪心 NMS，不区分类别
///
/// 按得分降序（同分保持原顺序）依次保留得分最高的框，并移除与其
/// IoU 大于等于 `iou_threshold` 的剩余框。返回按保留顺序排列的下标。
pub fn suppress(boxes: &[BBox], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
  debug_assert_eq!(boxes.len(), scores.len());

  let mut remaining: Vec<usize> = (0..boxes.len().min(scores.len())).collect();
  // sort_by 为稳定排序
  remaining.sort_by(|&i, &j| scores[j].total_cmp(&scores[i]));

  let mut keep = Vec::new();
  while !remaining.is_empty() {
    let best = remaining.remove(0);
    keep.push(best);
    remaining.retain(|&idx| iou(&boxes[best], &boxes[idx]) < iou_threshold);
  }

  keep
}

/// 对检测结果执行 NMS，输出顺序即保留顺序
pub fn suppress_items(items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  let boxes: Vec<BBox> = items.iter().map(|item| item.bbox).collect();
  let scores: Vec<f32> = items.iter().map(|item| item.score).collect();
  let keep = suppress(&boxes, &scores, iou_threshold);

  let mut slots: Vec<Option<DetectItem>> = items.into_iter().map(Some).collect();
  keep
    .into_iter()
    .filter_map(|idx| slots[idx].take())
    .collect()
}
