// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX Runtime 推理后端

use std::path::PathBuf;

use anyhow::{Context, Result};
use ndarray::{ArrayD, IxDyn};
use ort::execution_providers as ep;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use tracing::{debug, info};

use crate::preprocess::Batch;

/// 执行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

/// 推理后端配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    pub intra_threads: usize,
    pub trt_fp16: bool,
}

impl OrtConfig {
    pub fn new(f: impl Into<PathBuf>, ep: OrtEP) -> Self {
        Self {
            f: f.into(),
            ep,
            intra_threads: 4,
            trt_fp16: false,
        }
    }
}

/// ONNX Runtime 会话封装
pub struct OrtBackend {
    session: Session,
    inputs: Vec<String>,
    outputs: Vec<String>,
    ep: OrtEP,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        let mut builder = Session::builder().context("failed to create ORT session builder")?;
        builder = builder
            .with_intra_threads(config.intra_threads)
            .context("failed to set ORT intra threads")?;

        builder = match config.ep {
            OrtEP::CPU => builder,
            OrtEP::CUDA(device_id) => builder
                .with_execution_providers([ep::CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build()])
                .context("failed to register CUDA execution provider")?,
            OrtEP::Trt(device_id) => builder
                .with_execution_providers([
                    ep::TensorRTExecutionProvider::default()
                        .with_device_id(device_id)
                        .with_fp16(config.trt_fp16)
                        .build(),
                    ep::CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                ])
                .context("failed to register TensorRT execution provider")?,
        };

        let session = builder
            .commit_from_file(&config.f)
            .with_context(|| format!("failed to load model {}", config.f.display()))?;

        let inputs = session.inputs.iter().map(|i| i.name.clone()).collect();
        let outputs = session.outputs.iter().map(|o| o.name.clone()).collect();

        let backend = Self {
            session,
            inputs,
            outputs,
            ep: config.ep,
        };
        backend.summary(&config.f);
        Ok(backend)
    }

    pub fn input_names(&self) -> &[String] {
        &self.inputs
    }

    pub fn output_names(&self) -> &[String] {
        &self.outputs
    }

    /// 按输入名称组装 batch: `im_shape` / `scale_factor` 以外的输入都视为图像
    pub fn batch_inputs(&self, batch: &Batch) -> Vec<(String, ArrayD<f32>)> {
        self.inputs
            .iter()
            .map(|name| {
                let x = match name.as_str() {
                    "im_shape" => batch.im_shape.clone().into_dyn(),
                    "scale_factor" => batch.scale_factor.clone().into_dyn(),
                    _ => batch.image.clone().into_dyn(),
                };
                (name.clone(), x)
            })
            .collect()
    }

    /// 按名称送入输入, 按会话输出顺序返回 f32 输出 (其它类型的输出跳过)
    pub fn run(&mut self, xs: Vec<(String, ArrayD<f32>)>) -> Result<Vec<(String, ArrayD<f32>)>> {
        let mut inputs: Vec<(String, SessionInputValue<'static>)> = Vec::with_capacity(xs.len());
        for (name, x) in xs {
            let tensor = Tensor::from_array(x)
                .with_context(|| format!("failed to create input tensor `{name}`"))?;
            inputs.push((name, tensor.into_dyn().into()));
        }

        let outputs = self.session.run(inputs).context("ORT inference failed")?;

        let mut ys = Vec::with_capacity(self.outputs.len());
        for name in &self.outputs {
            let Ok((shape, data)) = outputs[name.as_str()].try_extract_tensor::<f32>() else {
                debug!(output = %name, "跳过非 f32 输出");
                continue;
            };
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            let y = ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
                .with_context(|| format!("output `{name}` has inconsistent shape"))?;
            ys.push((name.clone(), y));
        }
        Ok(ys)
    }

    fn summary(&self, f: &std::path::Path) {
        info!(
            model = %f.display(),
            ep = ?self.ep,
            inputs = ?self.inputs,
            outputs = ?self.outputs,
            "✅ 模型已加载"
        );
    }
}
