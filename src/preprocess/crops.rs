// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ReID 输入裁剪

use image::RgbImage;
use ndarray::{s, Array4};

use super::ops::{resize_rgb, Interp};
use crate::error::MotError;

/// ImageNet 均值/方差 (RGB)
const REID_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const REID_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 裁剪结果
#[derive(Clone, Debug)]
pub struct Crops {
    /// (N, 3, height, width)
    pub batch: Array4<f32>,
    /// 保留下来的检测框分数
    pub scores: Vec<f32>,
    /// 保留下来的检测框在输入中的下标
    pub kept: Vec<usize>,
}

impl Crops {
    pub fn len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

/// 按原图坐标 `xyxy` 裁剪目标区域并缩放到 `width x height`
///
/// 坐标截断为整数, 面积为0的框连同其分数一起丢弃
pub fn get_crops(
    xyxy: &[[f32; 4]],
    image: &RgbImage,
    scores: &[f32],
    width: u32,
    height: u32,
) -> Result<Crops, MotError> {
    let (img_w, img_h) = image.dimensions();
    let mut crops = Vec::with_capacity(xyxy.len());
    let mut kept_scores = Vec::with_capacity(xyxy.len());
    let mut kept = Vec::with_capacity(xyxy.len());

    for (i, bbox) in xyxy.iter().enumerate() {
        let x1 = (bbox[0] as i64).clamp(0, img_w as i64) as u32;
        let y1 = (bbox[1] as i64).clamp(0, img_h as i64) as u32;
        let x2 = (bbox[2] as i64).clamp(0, img_w as i64) as u32;
        let y2 = (bbox[3] as i64).clamp(0, img_h as i64) as u32;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let patch = image::imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
        crops.push(resize_rgb(&patch, width, height, Interp::Linear)?);
        kept_scores.push(scores.get(i).copied().unwrap_or(0.0));
        kept.push(i);
    }

    let (w, h) = (width as usize, height as usize);
    let mut batch = Array4::<f32>::zeros((crops.len(), 3, h, w));
    for (n, crop) in crops.iter().enumerate() {
        let mut dst = batch.slice_mut(s![n, .., .., ..]);
        for (x, y, pixel) in crop.enumerate_pixels() {
            for c in 0..3 {
                dst[[c, y as usize, x as usize]] =
                    (pixel[c] as f32 / 255.0 - REID_MEAN[c]) / REID_STD[c];
            }
        }
    }

    Ok(Crops {
        batch,
        scores: kept_scores,
        kept,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_crops_drop_empty_boxes() {
        let img = RgbImage::from_pixel(100, 80, Rgb([255, 0, 0]));
        let boxes = [
            [10.0, 10.0, 50.0, 70.0],
            [30.5, 20.0, 30.9, 60.0], // 截断后宽度为0
            [90.0, 70.0, 200.0, 200.0],
        ];
        let crops = get_crops(&boxes, &img, &[0.9, 0.8, 0.7], 64, 192).unwrap();
        assert_eq!(crops.batch.dim(), (2, 3, 192, 64));
        assert_eq!(crops.scores, vec![0.9, 0.7]);
        assert_eq!(crops.kept, vec![0, 2]);

        let red = (1.0 - 0.485) / 0.229;
        assert!((crops.batch[[0, 0, 100, 30]] - red).abs() < 1e-4);
        let green = (0.0 - 0.456) / 0.224;
        assert!((crops.batch[[1, 1, 0, 0]] - green).abs() < 1e-4);
    }

    #[test]
    fn test_no_boxes() {
        let img = RgbImage::new(10, 10);
        let crops = get_crops(&[], &img, &[], 64, 192).unwrap();
        assert!(crops.is_empty());
        assert_eq!(crops.batch.dim(), (0, 3, 192, 64));
    }
}
