// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use ndarray::{s, Array2, Array3, Array4, Axis};

use super::SampleMeta;
use crate::error::MotError;

/// 模型输入 batch
#[derive(Clone, Debug)]
pub struct Batch {
    /// (N, C, H, W)
    pub image: Array4<f32>,
    /// (N, 2) 每张图的 [h, w]
    pub im_shape: Array2<f32>,
    /// (N, 2) 每张图的 [scale_y, scale_x]
    pub scale_factor: Array2<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.image.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 把若干 CHW 张量组装成一个 batch
///
/// 单张图直接增加batch维; 多张图时建立 `max_h x max_w` 的零画布,
/// 每张图放在左上角, 只有右侧/下侧补零
pub fn create_inputs(images: Vec<Array3<f32>>, metas: &[SampleMeta]) -> Result<Batch, MotError> {
    if images.is_empty() {
        return Err(MotError::Preprocess("empty batch".to_string()));
    }
    if images.len() != metas.len() {
        return Err(MotError::Preprocess(format!(
            "batch has {} images but {} infos",
            images.len(),
            metas.len()
        )));
    }

    let n = images.len();
    let mut im_shape = Array2::<f32>::zeros((n, 2));
    let mut scale_factor = Array2::<f32>::zeros((n, 2));
    for (i, meta) in metas.iter().enumerate() {
        im_shape[[i, 0]] = meta.im_shape[0];
        im_shape[[i, 1]] = meta.im_shape[1];
        scale_factor[[i, 0]] = meta.scale_factor[0];
        scale_factor[[i, 1]] = meta.scale_factor[1];
    }

    let image = if n == 1 {
        let mut images = images;
        let single = images.remove(0);
        single.insert_axis(Axis(0))
    } else {
        let channels = images[0].shape()[0];
        if images.iter().any(|img| img.shape()[0] != channels) {
            return Err(MotError::Preprocess(
                "images in a batch must have the same channel count".to_string(),
            ));
        }
        let max_h = images.iter().map(|img| img.shape()[1]).max().unwrap_or(0);
        let max_w = images.iter().map(|img| img.shape()[2]).max().unwrap_or(0);

        let mut canvas = Array4::<f32>::zeros((n, channels, max_h, max_w));
        for (i, img) in images.iter().enumerate() {
            let (_, h, w) = img.dim();
            canvas.slice_mut(s![i, .., ..h, ..w]).assign(img);
        }
        canvas
    };

    Ok(Batch {
        image,
        im_shape,
        scale_factor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn meta(h: u32, w: u32) -> SampleMeta {
        SampleMeta::from_image(&RgbImage::new(w, h))
    }

    #[test]
    fn test_single_image_batch() {
        let img = Array3::<f32>::from_elem((3, 4, 5), 2.0);
        let batch = create_inputs(vec![img], &[meta(4, 5)]).unwrap();
        assert_eq!(batch.image.dim(), (1, 3, 4, 5));
        assert_eq!(batch.im_shape.row(0).to_vec(), vec![4.0, 5.0]);
        assert_eq!(batch.scale_factor.row(0).to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_two_images_padded_top_left() {
        let a = Array3::<f32>::from_elem((3, 4, 2), 1.0);
        let b = Array3::<f32>::from_elem((3, 2, 6), 2.0);
        let batch = create_inputs(vec![a, b], &[meta(4, 2), meta(2, 6)]).unwrap();
        assert_eq!(batch.image.dim(), (2, 3, 4, 6));

        // 第一张: rows [0,4), cols [0,2)
        assert_eq!(batch.image[[0, 2, 3, 1]], 1.0);
        assert_eq!(batch.image[[0, 0, 0, 2]], 0.0);
        // 第二张: rows [0,2), cols [0,6)
        assert_eq!(batch.image[[1, 1, 1, 5]], 2.0);
        assert_eq!(batch.image[[1, 1, 2, 0]], 0.0);
    }

    #[test]
    fn test_mismatched_infos() {
        let a = Array3::<f32>::zeros((3, 2, 2));
        assert!(create_inputs(vec![a], &[]).is_err());
        assert!(create_inputs(Vec::new(), &[]).is_err());
    }
}
