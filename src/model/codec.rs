// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/model/codec.rs - 模型输入编码与输出解码
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

use tracing::{debug, warn};

use crate::{
  frame::{ChannelOrder, Frame, InputTensor, RGB_CHANNELS},
  letterbox::Letterbox,
  model::{BBox, DetectItem},
};

// 每个预测的属性布局: cx, cy, w, h, objectness, class scores...
const OBJECTNESS_INDEX: usize = 4;
const CLASS_SCORE_OFFSET: usize = 5;
// 解码后的角点被限制在 ±2^29 内，角点之差与之和都不会溢出 i32
const COORD_LIMIT: f32 = (1 << 29) as f32;

/// 把图像编码为模型输入
///
/// 先按 `letterbox` 缩放并填充，再重排为 `order` 指定的通道顺序，
/// 拆成 CHW 平面并归一化到 `[0, 1]`。`fill` 按模型通道顺序给出。
pub fn encode(
  frame: &Frame,
  letterbox: &Letterbox,
  fill: [u8; 3],
  order: ChannelOrder,
) -> InputTensor {
  let swap = frame.order() != order;
  let source_fill = if swap {
    [fill[2], fill[1], fill[0]]
  } else {
    fill
  };

  let canvas = letterbox.apply(frame.image(), source_fill);
  let (width, height) = canvas.dimensions();
  let (width, height) = (width as usize, height as usize);
  let plane = width * height;

  let mut tensor = InputTensor::with_shape(RGB_CHANNELS, height, width);
  let slice = tensor.as_mut();

  for (x, y, pixel) in canvas.enumerate_pixels() {
    let offset = y as usize * width + x as usize;
    for c in 0..RGB_CHANNELS {
      let source_c = if swap { RGB_CHANNELS - 1 - c } else { c };
      slice[c * plane + offset] = pixel[source_c] as f32 / 255.0;
    }
  }

  tensor
}

/// 推理输出：扁平的 f32 数据与 `[batch, attributes, predictions]` 形状
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
  pub data: Box<[f32]>,
  pub shape: Vec<i64>,
}

impl RawOutput {
  pub fn new(data: impl Into<Box<[f32]>>, shape: Vec<i64>) -> Self {
    Self {
      data: data.into(),
      shape,
    }
  }

  /// 校验形状并返回 `(attributes, predictions)`，只取第一个 batch
  pub fn layout(&self) -> Option<(usize, usize)> {
    let &[batch, attributes, predictions] = self.shape.as_slice() else {
      warn!("模型输出维度异常: {:?}", self.shape);
      return None;
    };

    if batch <= 0 || attributes < CLASS_SCORE_OFFSET as i64 || predictions <= 0 {
      warn!("模型输出形状无效: {:?}", self.shape);
      return None;
    }

    let (attributes, predictions) = (attributes as usize, predictions as usize);
    if self.data.len() < attributes * predictions {
      warn!(
        "模型输出长度不足: 形状 {:?}, 实际长度 {}",
        self.shape,
        self.data.len()
      );
      return None;
    }

    Some((attributes, predictions))
  }
}

// 向零截断，NaN 记为 0
fn to_coord(value: f32) -> i32 {
  value.clamp(-COORD_LIMIT, COORD_LIMIT) as i32
}

/// 解码模型输出为原图坐标下的候选框
///
/// objectness 未达到阈值的预测直接跳过；有类别分数时最终得分为
/// `objectness * max(class)`，且必须严格大于同一阈值。
/// 形状无效时返回空列表。
pub fn decode(output: &RawOutput, letterbox: &Letterbox, confidence_threshold: f32) -> Vec<DetectItem> {
  let Some((num_attrs, num_preds)) = output.layout() else {
    return Vec::new();
  };
  let num_classes = num_attrs - CLASS_SCORE_OFFSET;
  let at = |attr: usize, pred: usize| output.data[attr * num_preds + pred];

  let mut items = Vec::new();
  for i in 0..num_preds {
    let objectness = at(OBJECTNESS_INDEX, i);
    if objectness.is_nan() || objectness < confidence_threshold {
      continue;
    }

    let (score, class_id) = if num_classes > 0 {
      let mut best = 0.0f32;
      let mut class_id = 0usize;
      for c in 0..num_classes {
        let conf = objectness * at(CLASS_SCORE_OFFSET + c, i);
        if conf > best {
          best = conf;
          class_id = c;
        }
      }
      (best, class_id as u32)
    } else {
      (objectness, 0)
    };

    if score.is_nan() || score <= confidence_threshold {
      continue;
    }

    let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
    let (x1, y1) = letterbox.inverse(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = letterbox.inverse(cx + w / 2.0, cy + h / 2.0);

    items.push(DetectItem {
      class_id,
      score,
      bbox: BBox::new(to_coord(x1), to_coord(y1), to_coord(x2), to_coord(y2)),
    });
  }

  debug!("解码得到 {} / {} 个候选框", items.len(), num_preds);
  items
}
