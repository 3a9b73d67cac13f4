// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ReID 特征提取 (ONNX), 输入 (N, 3, 192, 64), 输出 (N, D)

use anyhow::{Context, Result};
use ndarray::{Array2, Array4};

use super::{EmbedderModel, OrtBackend, OrtConfig};

pub struct OrtEmbedder {
    engine: OrtBackend,
}

impl OrtEmbedder {
    pub fn new(config: OrtConfig) -> Result<Self> {
        Ok(Self {
            engine: OrtBackend::build(config)?,
        })
    }
}

impl EmbedderModel for OrtEmbedder {
    fn embed(&mut self, crops: &Array4<f32>) -> Result<Array2<f32>> {
        if crops.shape()[0] == 0 {
            return Ok(Array2::zeros((0, 0)));
        }

        let name = self
            .engine
            .input_names()
            .first()
            .cloned()
            .unwrap_or_else(|| "x".to_string());
        let ys = self.engine.run(vec![(name, crops.clone().into_dyn())])?;
        let (_, feats) = ys.into_iter().next().context("ReID model produced no output")?;

        let n = crops.shape()[0];
        let dim = feats.len() / n.max(1);
        feats
            .into_shape_with_order((n, dim))
            .context("unexpected ReID output shape")
    }
}
