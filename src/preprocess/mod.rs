// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧预处理 (Frame Preprocessor)
//!
//! 解码 → 按顺序执行预处理算子 → CHW float 张量 + 元数据
//! - ops:   LetterBoxResize / Resize / NormalizeImage / Permute / PadStride
//! - batch: 多张图拼成一个batch (右下补零)
//! - crops: 按检测框裁剪ReID输入

pub mod batch;
pub mod crops;
pub mod ops;

use std::fs;
use std::path::PathBuf;

use image::RgbImage;
use ndarray::Array3;

use crate::detection::{Frame, Tlwh};
use crate::error::MotError;

pub use batch::{create_inputs, Batch};
pub use crops::{get_crops, Crops};
pub use ops::{Interp, PreprocessOp};

use ops::Stage;

/// 预处理输入
pub enum ImageInput {
    /// 图片文件路径
    Path(PathBuf),
    /// 编码后的图片字节 (jpg/png/...)
    Bytes(Vec<u8>),
    /// 已解码的RGB图像 (原样使用)
    Image(RgbImage),
}

/// 等比缩放参数 (用于把模型坐标映射回原图)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub ratio: f32,
    pub pad_w: f32,
    pub pad_h: f32,
}

/// 单帧预处理元数据
#[derive(Clone, Debug, PartialEq)]
pub struct SampleMeta {
    /// 解码后 (或Resize后) 的 [h, w]
    pub im_shape: [f32; 2],
    /// [scale_y, scale_x], LetterBoxResize 不修改 (保持 [1, 1])
    pub scale_factor: [f32; 2],
    pub letterbox: Option<Letterbox>,
    /// 最终张量的 [h, w]
    pub input_shape: [usize; 2],
    /// 原图 [h, w]
    pub ori_shape: [u32; 2],
}

impl SampleMeta {
    pub fn from_image(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        Self {
            im_shape: [h as f32, w as f32],
            scale_factor: [1.0, 1.0],
            letterbox: None,
            input_shape: [h as usize, w as usize],
            ori_shape: [h, w],
        }
    }

    /// 模型输入坐标 → 原图坐标 (未裁剪)
    pub fn to_original_xyxy(&self, xyxy: [f32; 4]) -> [f32; 4] {
        let [mut x1, mut y1, mut x2, mut y2] = xyxy;
        if let Some(lb) = self.letterbox {
            x1 = (x1 - lb.pad_w) / lb.ratio;
            x2 = (x2 - lb.pad_w) / lb.ratio;
            y1 = (y1 - lb.pad_h) / lb.ratio;
            y2 = (y2 - lb.pad_h) / lb.ratio;
        }
        let [sy, sx] = self.scale_factor;
        [x1 / sx, y1 / sy, x2 / sx, y2 / sy]
    }

    /// 裁剪到原图范围
    pub fn clip_xyxy(&self, xyxy: [f32; 4]) -> [f32; 4] {
        let [h, w] = self.ori_shape;
        let (w, h) = (w as f32, h as f32);
        [
            xyxy[0].clamp(0.0, w),
            xyxy[1].clamp(0.0, h),
            xyxy[2].clamp(0.0, w),
            xyxy[3].clamp(0.0, h),
        ]
    }

    /// 模型输入坐标 → 原图 tlwh
    pub fn to_original_tlwh(&self, xyxy: [f32; 4]) -> Tlwh {
        let [x1, y1, x2, y2] = self.clip_xyxy(self.to_original_xyxy(xyxy));
        Tlwh::from_xyxy(x1, y1, x2, y2)
    }
}

/// 预处理后的单帧 (生产者 → 队列 → 消费者)
#[derive(Debug)]
pub struct PreprocessedSample {
    pub batch: Batch,
    pub meta: SampleMeta,
    pub frame: Frame,
}

/// 解码图片, 输出RGB图像和初始元数据
pub fn decode_image(input: ImageInput) -> Result<(RgbImage, SampleMeta), MotError> {
    let img = match input {
        ImageInput::Path(path) => {
            let bytes = fs::read(&path)
                .map_err(|e| MotError::Preprocess(format!("{}: {e}", path.display())))?;
            decode_bytes(&bytes)?
        }
        ImageInput::Bytes(bytes) => decode_bytes(&bytes)?,
        ImageInput::Image(img) => img,
    };
    let meta = SampleMeta::from_image(&img);
    Ok((img, meta))
}

fn decode_bytes(bytes: &[u8]) -> Result<RgbImage, MotError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| MotError::Preprocess(e.to_string()))
}

/// 预处理器: 固定的算子列表
#[derive(Clone, Debug)]
pub struct Preprocessor {
    ops: Vec<PreprocessOp>,
}

impl Preprocessor {
    /// 缩放类算子必须排在 NormalizeImage/Permute 之前
    pub fn new(ops: Vec<PreprocessOp>) -> Result<Self, MotError> {
        let mut seen_float = false;
        for op in &ops {
            if op.is_resize() && seen_float {
                return Err(MotError::Preprocess(format!(
                    "{} must run before NormalizeImage/Permute",
                    op.name()
                )));
            }
            if matches!(
                op,
                PreprocessOp::NormalizeImage { .. } | PreprocessOp::Permute
            ) {
                seen_float = true;
            }
        }
        Ok(Self { ops })
    }

    pub fn ops(&self) -> &[PreprocessOp] {
        &self.ops
    }

    /// 解码 + 全部算子, 返回 CHW 张量
    pub fn run(&self, input: ImageInput) -> Result<(Array3<f32>, SampleMeta), MotError> {
        let (img, mut meta) = decode_image(input)?;
        let mut stage = Stage::Rgb(img);
        for op in &self.ops {
            stage = op.apply(stage, &mut meta)?;
        }

        let chw = stage.into_chw()?;
        let (_, h, w) = chw.dim();
        meta.input_shape = [h, w];
        Ok((chw, meta))
    }

    /// 预处理一帧, 输出 batch=1 的样本
    pub fn process_frame(&self, frame: &Frame) -> Result<PreprocessedSample, MotError> {
        let (chw, meta) = self.run(ImageInput::Image(frame.image.as_ref().clone()))?;
        let batch = create_inputs(vec![chw], std::slice::from_ref(&meta))?;
        Ok(PreprocessedSample {
            batch,
            meta,
            frame: frame.clone(),
        })
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            ops: PreprocessOp::default_pipeline(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_decode_bytes_to_rgb() {
        let img = RgbImage::from_pixel(8, 4, Rgb([200, 100, 50]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let (decoded, meta) = decode_image(ImageInput::Bytes(bytes)).unwrap();
        assert_eq!(decoded.get_pixel(3, 2), &Rgb([200, 100, 50]));
        assert_eq!(meta.im_shape, [4.0, 8.0]);
        assert_eq!(meta.scale_factor, [1.0, 1.0]);
    }

    #[test]
    fn test_default_pipeline_letterbox() {
        let frame = Frame::new(0, RgbImage::from_pixel(1920, 1080, Rgb([255, 255, 255])));
        let sample = Preprocessor::default().process_frame(&frame).unwrap();

        assert_eq!(sample.batch.image.dim(), (1, 3, 608, 1088));
        assert_eq!(sample.meta.im_shape, [1080.0, 1920.0]);
        assert_eq!(sample.meta.scale_factor, [1.0, 1.0]);
        assert_eq!(sample.meta.input_shape, [608, 1088]);
        let lb = sample.meta.letterbox.unwrap();
        assert!((lb.ratio - 608.0 / 1080.0).abs() < 1e-6);
        assert_eq!(lb.pad_h, 0.0);
        assert_eq!(lb.pad_w, 3.5);

        // 左侧3列为填充 127.5/255, 中间为图像 1.0
        let left = sample.batch.image[[0, 0, 300, 0]];
        assert!((left - 0.5).abs() < 1e-6);
        assert!((sample.batch.image[[0, 1, 304, 544]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_implicit_chw_without_permute() {
        let pre = Preprocessor::new(vec![PreprocessOp::Resize {
            target_size: [10, 20],
            keep_ratio: false,
            interp: Interp::Nearest,
        }])
        .unwrap();
        let (chw, meta) = pre
            .run(ImageInput::Image(RgbImage::new(40, 20)))
            .unwrap();
        assert_eq!(chw.dim(), (3, 10, 20));
        assert_eq!(meta.scale_factor, [0.5, 0.5]);
        assert_eq!(meta.im_shape, [10.0, 20.0]);
    }

    #[test]
    fn test_rejects_resize_after_normalize() {
        let ops = vec![
            PreprocessOp::Permute,
            PreprocessOp::LetterBoxResize {
                target_size: [32, 32],
            },
        ];
        assert!(matches!(
            Preprocessor::new(ops),
            Err(MotError::Preprocess(_))
        ));
    }

    #[test]
    fn test_to_original_coords() {
        let frame = RgbImage::new(200, 100);
        let mut meta = SampleMeta::from_image(&frame);
        meta.letterbox = Some(Letterbox {
            ratio: 0.5,
            pad_w: 0.0,
            pad_h: 25.0,
        });

        let xyxy = meta.to_original_xyxy([10.0, 30.0, 50.0, 75.0]);
        assert_eq!(xyxy, [20.0, 10.0, 100.0, 100.0]);

        let tlwh = meta.to_original_tlwh([-10.0, 20.0, 120.0, 80.0]);
        assert_eq!(tlwh, Tlwh::new(0.0, 0.0, 200.0, 100.0));
    }
}
