// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器 (ONNX), 输出 `bbox`: (N, 6) `[cls, score, x1, y1, x2, y2]`

use anyhow::{bail, Context, Result};
use ndarray::{Array2, Ix2};

use super::{DetectorModel, OrtBackend, OrtConfig};
use crate::preprocess::PreprocessedSample;

pub struct OrtDetector {
    engine: OrtBackend,
}

impl OrtDetector {
    pub fn new(config: OrtConfig) -> Result<Self> {
        Ok(Self {
            engine: OrtBackend::build(config)?,
        })
    }
}

impl DetectorModel for OrtDetector {
    fn detect(&mut self, sample: &PreprocessedSample) -> Result<Array2<f32>> {
        let xs = self.engine.batch_inputs(&sample.batch);
        let ys = self.engine.run(xs)?;

        // bbox_num 等整型输出已被跳过, 取第一个 (N, 6) 输出
        let Some((_, bbox)) = ys
            .into_iter()
            .find(|(_, y)| y.ndim() == 2 && y.shape()[1] == 6)
        else {
            bail!("detector produced no (N, 6) bbox output");
        };
        let bbox = bbox
            .into_dimensionality::<Ix2>()
            .context("bbox output should be 2-D")?;

        // 部分导出模型在无目标时输出一行 [-1, ...]
        let keep: Vec<usize> = (0..bbox.nrows()).filter(|&i| bbox[[i, 0]] >= 0.0).collect();
        if keep.len() == bbox.nrows() {
            return Ok(bbox);
        }
        Ok(bbox.select(ndarray::Axis(0), &keep))
    }
}
