/// 模型统一接口
///
/// # 架构说明
///
/// 神经网络本身不在本库内实现, 推理循环只依赖下面三个接口:
///
/// ## JointDetEmbModel (JDE / FairMOT)
/// - 单阶段: 一次前向同时输出检测框和ReID特征
/// - 返回原图坐标下的 `Detection` (带 embedding)
///
/// ## DetectorModel + EmbedderModel (DeepSORT)
/// - 检测器输出 `[cls, score, x1, y1, x2, y2]` 行, 坐标在模型输入空间
/// - ReID模型对裁剪后的目标输出特征向量
/// - 检测器可选: 没有检测器时从检测结果文件读取
///
/// ## MotModel
/// 构造时确定模型能力, 推理循环不再按帧判断模型类型
///
/// ## ONNX Runtime 适配器
/// 启用 `onnx` 特性后提供 `OrtJointModel` / `OrtDetector` / `OrtEmbedder`
use anyhow::Result;
use ndarray::{Array2, Array4};

use crate::config::ModelFamily;
use crate::detection::Detection;
use crate::error::MotError;
use crate::preprocess::PreprocessedSample;

/// 联合检测+嵌入模型
pub trait JointDetEmbModel {
    /// 单帧前向, 返回原图坐标下的检测框 (含ReID特征)
    fn forward(&mut self, sample: &PreprocessedSample) -> Result<Vec<Detection>>;
}

/// 检测器
pub trait DetectorModel {
    /// 单帧前向, 返回 (N, 6): `[cls, score, x1, y1, x2, y2]`
    fn detect(&mut self, sample: &PreprocessedSample) -> Result<Array2<f32>>;
}

/// ReID 特征提取模型
pub trait EmbedderModel {
    /// (N, 3, H, W) → (N, D)
    fn embed(&mut self, crops: &Array4<f32>) -> Result<Array2<f32>>;
}

/// 模型能力
pub enum MotModel {
    /// JDE / FairMOT
    Joint(Box<dyn JointDetEmbModel>),
    /// DeepSORT: 检测器 (可选) + ReID
    Separate {
        detector: Option<Box<dyn DetectorModel>>,
        embedder: Box<dyn EmbedderModel>,
    },
}

impl MotModel {
    pub fn joint(model: impl JointDetEmbModel + 'static) -> Self {
        MotModel::Joint(Box::new(model))
    }

    pub fn separate(
        detector: Option<Box<dyn DetectorModel>>,
        embedder: impl EmbedderModel + 'static,
    ) -> Self {
        MotModel::Separate {
            detector,
            embedder: Box::new(embedder),
        }
    }

    pub fn is_joint(&self) -> bool {
        matches!(self, MotModel::Joint(_))
    }

    pub fn has_detector(&self) -> bool {
        matches!(
            self,
            MotModel::Separate {
                detector: Some(_),
                ..
            }
        )
    }

    /// 检查模型族与模型能力是否一致
    pub fn check_family(&self, family: ModelFamily) -> Result<(), MotError> {
        match (family.is_joint(), self.is_joint()) {
            (true, true) | (false, false) => Ok(()),
            (true, false) => Err(MotError::CapabilityMismatch(format!(
                "{family} needs a joint detection+embedding model"
            ))),
            (false, true) => Err(MotError::CapabilityMismatch(format!(
                "{family} needs a detector/embedder pair"
            ))),
        }
    }
}

#[cfg(feature = "onnx")]
pub mod detector;
#[cfg(feature = "onnx")]
pub mod jde;
#[cfg(feature = "onnx")]
pub mod ort_backend;
#[cfg(feature = "onnx")]
pub mod reid;

#[cfg(feature = "onnx")]
pub use detector::OrtDetector;
#[cfg(feature = "onnx")]
pub use jde::OrtJointModel;
#[cfg(feature = "onnx")]
pub use ort_backend::{OrtBackend, OrtConfig, OrtEP};
#[cfg(feature = "onnx")]
pub use reid::OrtEmbedder;

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopJoint;
    impl JointDetEmbModel for NoopJoint {
        fn forward(&mut self, _sample: &PreprocessedSample) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    struct NoopEmbedder;
    impl EmbedderModel for NoopEmbedder {
        fn embed(&mut self, crops: &Array4<f32>) -> Result<Array2<f32>> {
            Ok(Array2::zeros((crops.shape()[0], 4)))
        }
    }

    #[test]
    fn test_capability_check() {
        let joint = MotModel::joint(NoopJoint);
        assert!(joint.check_family(ModelFamily::Jde).is_ok());
        assert!(joint.check_family(ModelFamily::FairMot).is_ok());
        assert!(matches!(
            joint.check_family(ModelFamily::DeepSort),
            Err(MotError::CapabilityMismatch(_))
        ));

        let separate = MotModel::separate(None, NoopEmbedder);
        assert!(!separate.has_detector());
        assert!(separate.check_family(ModelFamily::DeepSort).is_ok());
        assert!(separate.check_family(ModelFamily::Jde).is_err());
    }
}
