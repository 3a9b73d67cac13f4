// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! JDE / FairMOT 联合模型 (ONNX)
//!
//! 输出约定:
//! - `pred_dets`: (N, 5+) `[x1, y1, x2, y2, score, ...]`
//! - `pred_embs`: (N, D)

use anyhow::{bail, Context, Result};
use ndarray::{ArrayD, Ix2};

use super::{JointDetEmbModel, OrtBackend, OrtConfig};
use crate::detection::{Detection, Tlwh};
use crate::preprocess::PreprocessedSample;

pub struct OrtJointModel {
    engine: OrtBackend,
    /// 模型输出的框是否仍在输入空间 (需要去掉letterbox)
    input_space_boxes: bool,
}

impl OrtJointModel {
    pub fn new(config: OrtConfig) -> Result<Self> {
        let engine = OrtBackend::build(config)?;
        Ok(Self {
            engine,
            input_space_boxes: false,
        })
    }

    pub fn with_input_space_boxes(mut self, yes: bool) -> Self {
        self.input_space_boxes = yes;
        self
    }
}

/// 按名称挑选输出, 找不到时按下标
fn pick<'a>(ys: &'a [(String, ArrayD<f32>)], key: &str, fallback: usize) -> Option<&'a ArrayD<f32>> {
    ys.iter()
        .find(|(name, _)| name.contains(key))
        .or_else(|| ys.get(fallback))
        .map(|(_, y)| y)
}

impl JointDetEmbModel for OrtJointModel {
    fn forward(&mut self, sample: &PreprocessedSample) -> Result<Vec<Detection>> {
        let xs = self.engine.batch_inputs(&sample.batch);
        let ys = self.engine.run(xs)?;

        let dets = pick(&ys, "det", 0)
            .context("joint model produced no detection output")?
            .clone()
            .into_dimensionality::<Ix2>()
            .context("pred_dets should be 2-D")?;
        let embs = pick(&ys, "emb", 1)
            .context("joint model produced no embedding output")?
            .clone()
            .into_dimensionality::<Ix2>()
            .context("pred_embs should be 2-D")?;

        if dets.nrows() == 0 {
            return Ok(Vec::new());
        }
        if dets.ncols() < 5 {
            bail!("pred_dets needs at least 5 columns, got {}", dets.ncols());
        }
        if embs.nrows() != dets.nrows() {
            bail!(
                "pred_dets has {} rows but pred_embs has {}",
                dets.nrows(),
                embs.nrows()
            );
        }

        let detections = dets
            .outer_iter()
            .zip(embs.outer_iter())
            .map(|(det, emb)| {
                let xyxy = [det[0], det[1], det[2], det[3]];
                let tlwh = if self.input_space_boxes {
                    sample.meta.to_original_tlwh(xyxy)
                } else {
                    Tlwh::from_xyxy(xyxy[0], xyxy[1], xyxy[2], xyxy[3])
                };
                Detection::new(tlwh, det[4], Some(emb.to_vec()))
            })
            .collect();
        Ok(detections)
    }
}
