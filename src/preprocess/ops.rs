// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 预处理算子
//!
//! 算子以 `{"type": "LetterBoxResize", ...}` 形式出现在配置文件里,
//! 按顺序依次作用在同一张图上。

use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{s, Array3, Axis};
use serde::{Deserialize, Serialize};

use super::{Letterbox, SampleMeta};
use crate::error::MotError;

/// 插值方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interp {
    Nearest,
    #[default]
    Linear,
    Area,
    Cubic,
}

impl Interp {
    fn resize_alg(self) -> fr::ResizeAlg {
        match self {
            Interp::Nearest => fr::ResizeAlg::Nearest,
            Interp::Linear => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
            Interp::Area => fr::ResizeAlg::Convolution(fr::FilterType::Box),
            Interp::Cubic => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
        }
    }
}

fn default_true() -> bool {
    true
}

/// 单个预处理算子
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PreprocessOp {
    /// 等比缩放 + 灰边填充, `target_size = [h, w]`
    LetterBoxResize { target_size: [u32; 2] },
    /// 缩放, `target_size = [h, w]`
    Resize {
        target_size: [u32; 2],
        #[serde(default)]
        keep_ratio: bool,
        #[serde(default)]
        interp: Interp,
    },
    /// 归一化: `(x / 255 - mean) / std`
    NormalizeImage {
        mean: [f32; 3],
        std: [f32; 3],
        #[serde(default = "default_true")]
        is_scale: bool,
    },
    /// HWC → CHW
    Permute,
    /// 右下补零到 stride 的整数倍
    PadStride { stride: i32 },
}

impl PreprocessOp {
    /// 默认流水线 (JDE/FairMOT 576x1088 系列输入)
    pub fn default_pipeline() -> Vec<PreprocessOp> {
        vec![
            PreprocessOp::LetterBoxResize {
                target_size: [608, 1088],
            },
            PreprocessOp::NormalizeImage {
                mean: [0.0, 0.0, 0.0],
                std: [1.0, 1.0, 1.0],
                is_scale: true,
            },
            PreprocessOp::Permute,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PreprocessOp::LetterBoxResize { .. } => "LetterBoxResize",
            PreprocessOp::Resize { .. } => "Resize",
            PreprocessOp::NormalizeImage { .. } => "NormalizeImage",
            PreprocessOp::Permute => "Permute",
            PreprocessOp::PadStride { .. } => "PadStride",
        }
    }

    pub fn is_resize(&self) -> bool {
        matches!(
            self,
            PreprocessOp::LetterBoxResize { .. } | PreprocessOp::Resize { .. }
        )
    }

    pub(crate) fn apply(&self, stage: Stage, meta: &mut SampleMeta) -> Result<Stage, MotError> {
        match *self {
            PreprocessOp::LetterBoxResize { target_size } => {
                let img = stage.into_rgb(self.name())?;
                let (canvas, letterbox) = letterbox_resize(&img, target_size)?;
                meta.letterbox = Some(letterbox);
                Ok(Stage::Hwc {
                    data: canvas,
                    normalized: false,
                })
            }
            PreprocessOp::Resize {
                target_size,
                keep_ratio,
                interp,
            } => {
                let img = stage.into_rgb(self.name())?;
                let (resized, scale) = resize(&img, target_size, keep_ratio, interp)?;
                meta.im_shape = [
                    img.height() as f32 * scale[0],
                    img.width() as f32 * scale[1],
                ];
                meta.scale_factor = scale;
                Ok(Stage::Rgb(resized))
            }
            PreprocessOp::NormalizeImage {
                mean,
                std,
                is_scale,
            } => normalize(stage, mean, std, is_scale),
            PreprocessOp::Permute => match stage {
                Stage::Chw(data) => Ok(Stage::Chw(data)),
                other => Ok(Stage::Chw(other.into_chw()?)),
            },
            PreprocessOp::PadStride { stride } => {
                let chw = stage.into_chw()?;
                Ok(Stage::Chw(pad_stride(chw, stride)))
            }
        }
    }
}

// ========== 中间状态 ==========

/// 算子之间传递的图像
pub(crate) enum Stage {
    /// 原始 u8 图像
    Rgb(RgbImage),
    /// float HWC
    Hwc { data: Array3<f32>, normalized: bool },
    /// float CHW
    Chw(Array3<f32>),
}

impl Stage {
    fn into_rgb(self, op: &str) -> Result<RgbImage, MotError> {
        match self {
            Stage::Rgb(img) => Ok(img),
            Stage::Hwc {
                data,
                normalized: false,
            } => hwc_to_rgb(&data),
            _ => Err(MotError::Preprocess(format!(
                "{op} must run before NormalizeImage/Permute"
            ))),
        }
    }

    fn into_hwc(self) -> Result<Array3<f32>, MotError> {
        match self {
            Stage::Rgb(img) => rgb_to_hwc(&img),
            Stage::Hwc { data, .. } => Ok(data),
            Stage::Chw(data) => Ok(data.permuted_axes([1, 2, 0]).as_standard_layout().to_owned()),
        }
    }

    pub(crate) fn into_chw(self) -> Result<Array3<f32>, MotError> {
        match self {
            Stage::Chw(data) => Ok(data),
            other => Ok(other
                .into_hwc()?
                .permuted_axes([2, 0, 1])
                .as_standard_layout()
                .to_owned()),
        }
    }
}

fn rgb_to_hwc(img: &RgbImage) -> Result<Array3<f32>, MotError> {
    let (w, h) = img.dimensions();
    let data: Vec<f32> = img.as_raw().iter().map(|&v| v as f32).collect();
    Array3::from_shape_vec((h as usize, w as usize, 3), data)
        .map_err(|e| MotError::Preprocess(e.to_string()))
}

fn hwc_to_rgb(data: &Array3<f32>) -> Result<RgbImage, MotError> {
    let (h, w, _) = data.dim();
    let raw: Vec<u8> = data
        .iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    RgbImage::from_raw(w as u32, h as u32, raw)
        .ok_or_else(|| MotError::Preprocess("HWC buffer size mismatch".to_string()))
}

/// 使用 fast_image_resize 缩放 RGB 图像
pub(crate) fn resize_rgb(
    img: &RgbImage,
    width: u32,
    height: u32,
    interp: Interp,
) -> Result<RgbImage, MotError> {
    if width == 0 || height == 0 {
        return Err(MotError::Preprocess(format!(
            "invalid resize target {width}x{height}"
        )));
    }
    if img.dimensions() == (width, height) {
        return Ok(img.clone());
    }

    let src = fr::images::ImageRef::new(img.width(), img.height(), img.as_raw(), fr::PixelType::U8x3)
        .map_err(|e| MotError::Preprocess(e.to_string()))?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new().resize_alg(interp.resize_alg()),
        )
        .map_err(|e| MotError::Preprocess(e.to_string()))?;

    RgbImage::from_raw(width, height, dst.into_vec())
        .ok_or_else(|| MotError::Preprocess("resize buffer size mismatch".to_string()))
}

/// 等比缩放到 `[h, w]`, 四周用 127.5 填充
///
/// 上下/左右的填充量分别为 `round(pad ∓ 0.1)`, 奇数像素差时多出的一行落在下/右侧
pub(crate) fn letterbox_resize(
    img: &RgbImage,
    target_size: [u32; 2],
) -> Result<(Array3<f32>, Letterbox), MotError> {
    let [height, width] = target_size;
    let (ori_w, ori_h) = img.dimensions();
    if ori_w == 0 || ori_h == 0 {
        return Err(MotError::Preprocess("empty image".to_string()));
    }

    let ratio = (height as f32 / ori_h as f32).min(width as f32 / ori_w as f32);
    let new_w = ((ori_w as f32 * ratio).round_ties_even() as u32).clamp(1, width);
    let new_h = ((ori_h as f32 * ratio).round_ties_even() as u32).clamp(1, height);
    let pad_w = (width - new_w) as f32 / 2.0;
    let pad_h = (height - new_h) as f32 / 2.0;
    let top = (pad_h - 0.1).round_ties_even().max(0.0) as usize;
    let left = (pad_w - 0.1).round_ties_even().max(0.0) as usize;

    let resized = resize_rgb(img, new_w, new_h, Interp::Area)?;
    let resized = rgb_to_hwc(&resized)?;

    let mut canvas = Array3::from_elem((height as usize, width as usize, 3), 127.5f32);
    canvas
        .slice_mut(s![top..top + new_h as usize, left..left + new_w as usize, ..])
        .assign(&resized);

    Ok((
        canvas,
        Letterbox {
            ratio,
            pad_w,
            pad_h,
        },
    ))
}

/// 缩放, 返回 `[scale_y, scale_x]`
///
/// `keep_ratio` 时按短边缩放到目标短边, 同时长边不超过目标长边
fn resize(
    img: &RgbImage,
    target_size: [u32; 2],
    keep_ratio: bool,
    interp: Interp,
) -> Result<(RgbImage, [f32; 2]), MotError> {
    let (ori_w, ori_h) = img.dimensions();
    if ori_w == 0 || ori_h == 0 {
        return Err(MotError::Preprocess("empty image".to_string()));
    }
    let [target_h, target_w] = target_size;

    let (scale_y, scale_x) = if keep_ratio {
        let im_min = ori_h.min(ori_w) as f32;
        let im_max = ori_h.max(ori_w) as f32;
        let target_min = target_h.min(target_w) as f32;
        let target_max = target_h.max(target_w) as f32;
        let scale = (target_min / im_min).min(target_max / im_max);
        (scale, scale)
    } else {
        (
            target_h as f32 / ori_h as f32,
            target_w as f32 / ori_w as f32,
        )
    };

    let new_w = (ori_w as f32 * scale_x).round_ties_even().max(1.0) as u32;
    let new_h = (ori_h as f32 * scale_y).round_ties_even().max(1.0) as u32;
    let resized = resize_rgb(img, new_w, new_h, interp)?;
    Ok((resized, [scale_y, scale_x]))
}

fn normalize(stage: Stage, mean: [f32; 3], std: [f32; 3], is_scale: bool) -> Result<Stage, MotError> {
    if std.iter().any(|&s| s == 0.0) {
        return Err(MotError::Preprocess("NormalizeImage std must be non-zero".to_string()));
    }

    let (mut data, channel_axis, chw) = match stage {
        Stage::Chw(data) => (data, Axis(0), true),
        other => (other.into_hwc()?, Axis(2), false),
    };

    if is_scale {
        data.mapv_inplace(|v| v / 255.0);
    }
    for (c, mut lane) in data.axis_iter_mut(channel_axis).enumerate() {
        let (m, s) = (mean[c], std[c]);
        lane.mapv_inplace(|v| (v - m) / s);
    }

    Ok(if chw {
        Stage::Chw(data)
    } else {
        Stage::Hwc {
            data,
            normalized: true,
        }
    })
}

fn pad_stride(chw: Array3<f32>, stride: i32) -> Array3<f32> {
    if stride <= 0 {
        return chw;
    }
    let stride = stride as usize;
    let (c, h, w) = chw.dim();
    let pad_h = h.div_ceil(stride) * stride;
    let pad_w = w.div_ceil(stride) * stride;
    if pad_h == h && pad_w == w {
        return chw;
    }

    let mut padded = Array3::<f32>::zeros((c, pad_h, pad_w));
    padded.slice_mut(s![.., ..h, ..w]).assign(&chw);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_serde_tagged_ops() {
        let json = r#"[
            {"type": "LetterBoxResize", "target_size": [320, 576]},
            {"type": "NormalizeImage", "mean": [0.0, 0.0, 0.0], "std": [1.0, 1.0, 1.0]},
            {"type": "Permute"},
            {"type": "PadStride", "stride": 32}
        ]"#;
        let ops: Vec<PreprocessOp> = serde_json::from_str(json).unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(
            ops[0],
            PreprocessOp::LetterBoxResize {
                target_size: [320, 576]
            }
        );
        assert!(matches!(
            ops[1],
            PreprocessOp::NormalizeImage { is_scale: true, .. }
        ));
        assert_eq!(ops[3], PreprocessOp::PadStride { stride: 32 });
    }

    #[test]
    fn test_letterbox_geometry() {
        let img = RgbImage::from_pixel(200, 100, Rgb([10, 20, 30]));
        let (canvas, lb) = letterbox_resize(&img, [100, 100]).unwrap();
        assert_eq!(canvas.dim(), (100, 100, 3));
        assert!((lb.ratio - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad_w, 0.0);
        assert_eq!(lb.pad_h, 25.0);

        // 填充区域
        assert_eq!(canvas[[0, 0, 0]], 127.5);
        assert_eq!(canvas[[99, 99, 2]], 127.5);
        // 图像区域 rows [25, 75)
        assert_eq!(canvas[[25, 0, 0]], 10.0);
        assert_eq!(canvas[[74, 99, 2]], 30.0);
        assert_eq!(canvas[[75, 50, 0]], 127.5);
    }

    #[test]
    fn test_resize_keep_ratio() {
        let img = RgbImage::new(400, 200);
        let (resized, scale) = resize(&img, [100, 300], true, Interp::Linear).unwrap();
        assert_eq!(scale, [0.5, 0.5]);
        assert_eq!(resized.dimensions(), (200, 100));

        let (resized, scale) = resize(&img, [100, 100], false, Interp::Nearest).unwrap();
        assert_eq!(scale, [0.5, 0.25]);
        assert_eq!(resized.dimensions(), (100, 100));
    }

    #[test]
    fn test_normalize_and_permute() {
        let img = RgbImage::from_pixel(2, 3, Rgb([255, 0, 51]));
        let stage = normalize(Stage::Rgb(img), [0.5, 0.0, 0.0], [0.5, 1.0, 1.0], true).unwrap();
        let chw = stage.into_chw().unwrap();
        assert_eq!(chw.dim(), (3, 3, 2));
        assert!((chw[[0, 0, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(chw[[1, 2, 1]], 0.0);
        assert!((chw[[2, 1, 0]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_pad_stride() {
        let chw = Array3::<f32>::ones((3, 30, 33));
        let padded = pad_stride(chw, 32);
        assert_eq!(padded.dim(), (3, 32, 64));
        assert_eq!(padded[[0, 29, 32]], 1.0);
        assert_eq!(padded[[0, 30, 0]], 0.0);
        assert_eq!(padded[[2, 0, 33]], 0.0);

        let chw = Array3::<f32>::ones((3, 30, 33));
        assert_eq!(pad_stride(chw, 0).dim(), (3, 30, 33));
    }

    #[test]
    fn test_resize_after_normalize_rejected() {
        let img = RgbImage::new(4, 4);
        let mut meta = SampleMeta::from_image(&img);
        let stage = PreprocessOp::NormalizeImage {
            mean: [0.0; 3],
            std: [1.0; 3],
            is_scale: true,
        }
        .apply(Stage::Rgb(img), &mut meta)
        .unwrap();
        let op = PreprocessOp::Resize {
            target_size: [2, 2],
            keep_ratio: false,
            interp: Interp::Linear,
        };
        assert!(op.apply(stage, &mut meta).is_err());
    }
}
