// 该文件是 Qipan （棋盘识别） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::InputTensor,
  model::{
    Inference, RawOutput,
    detector::{ConfigError, Detector, DetectorConfig},
  },
};

const ONNX_NUM_INPUTS: usize = 1;

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("ONNX Runtime 错误: {0}")]
  Ort(#[from] ort::Error),
  #[error("模型参数错误: {0}")]
  Config(#[from] ConfigError),
  #[error("模型结构不符合要求: {0}")]
  ModelInvalid(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

/// 基于 ONNX Runtime 会话的推理后端
pub struct OnnxEngine {
  session: Session,
  // 输出元数据中的维度，动态维度为负数
  output_dims: Vec<i64>,
}

impl OnnxEngine {
  pub fn load(path: &str) -> Result<Self, OnnxError> {
    info!("加载模型文件: {}", path);
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .commit_from_file(path)?;

    if session.inputs.len() != ONNX_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        session.inputs.len()
      );
      return Err(OnnxError::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        session.inputs.len()
      )));
    }

    let output = session
      .outputs
      .first()
      .ok_or_else(|| OnnxError::ModelInvalid("模型没有输出".to_string()))?;
    let output_dims = output
      .output_type
      .tensor_dimensions()
      .cloned()
      .ok_or_else(|| OnnxError::ModelInvalid(format!("输出 {} 不是张量", output.name)))?;
    debug!("模型输出 {}: {:?}", output.name, output_dims);
    info!("模型加载完成");

    Ok(Self {
      session,
      output_dims,
    })
  }

  pub fn output_dims(&self) -> &[i64] {
    &self.output_dims
  }
}

/// 元数据中的静态维度优先，动态维度取运行时形状
fn resolve_shape(declared: &[i64], actual: &[i64]) -> Vec<i64> {
  if declared.len() != actual.len() {
    return actual.to_vec();
  }
  declared
    .iter()
    .zip(actual)
    .map(|(&d, &a)| if d > 0 { d } else { a })
    .collect()
}

impl Inference for OnnxEngine {
  type Error = OnnxError;

  fn run(&self, input: &InputTensor) -> Result<RawOutput, Self::Error> {
    let tensor = Tensor::from_array((input.shape(), input.as_ref().to_vec()))?;
    let outputs = self.session.run(ort::inputs![tensor]?)?;
    let (actual, data) = outputs[0].try_extract_raw_tensor::<f32>()?;
    let shape = resolve_shape(&self.output_dims, &actual);
    Ok(RawOutput::new(data.to_vec(), shape))
  }
}

/// `onnx:///path/model.onnx?width=640&height=640&confidence=0.5&nms=0.45`
pub struct OnnxDetectorBuilder {
  model_path: String,
  config: DetectorConfig,
}

impl FromUrlWithScheme for OnnxDetectorBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxDetectorBuilder {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(OnnxDetectorBuilder {
      model_path: url.path().to_string(),
      config: DetectorConfig::from_url(url)?,
    })
  }
}

impl OnnxDetectorBuilder {
  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Result<Detector<OnnxEngine>, OnnxError> {
    let engine = OnnxEngine::load(&self.model_path)?;
    Ok(Detector::new(engine, self.config)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dynamic_dims_take_runtime_values() {
    assert_eq!(resolve_shape(&[1, 84, -1], &[1, 84, 8400]), vec![1, 84, 8400]);
    assert_eq!(resolve_shape(&[-1, 16, 8400], &[1, 16, 8400]), vec![1, 16, 8400]);
  }

  #[test]
  fn rank_mismatch_uses_runtime_shape() {
    assert_eq!(resolve_shape(&[1, 84], &[1, 84, 10]), vec![1, 84, 10]);
  }

  #[test]
  fn builder_reads_path_and_query() {
    let url = Url::parse("onnx:///models/board.onnx?width=320&height=320&confidence=0.3").unwrap();
    let builder = OnnxDetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/models/board.onnx");
    assert_eq!(builder.config.input_width, 320);
    assert_eq!(builder.config.confidence_threshold, 0.3);
    assert_eq!(builder.config.nms_threshold, 0.45);
  }

  #[test]
  fn builder_rejects_other_schemes() {
    let url = Url::parse("rknn:///models/board.rknn").unwrap();
    assert!(matches!(
      OnnxDetectorBuilder::from_url(&url),
      Err(OnnxError::ModelPathError(_))
    ));
  }
}
