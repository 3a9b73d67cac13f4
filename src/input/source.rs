// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧来源 (视频/图片目录)

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::warn;

use crate::error::MotError;

/// 支持的图片扩展名 (大小写不敏感)
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// 帧来源 Trait
///
/// `read` 返回 None 表示流结束 (读取失败也视为结束)
pub trait FrameSource: Send {
    fn is_opened(&self) -> bool;

    fn read(&mut self) -> Option<RgbImage>;

    /// 来源帧率 (未知时为 None)
    fn frame_rate(&self) -> Option<f64> {
        None
    }

    /// 总帧数 (未知时为 None)
    fn frame_count(&self) -> Option<u64> {
        None
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn is_opened(&self) -> bool {
        (**self).is_opened()
    }

    fn read(&mut self) -> Option<RgbImage> {
        (**self).read()
    }

    fn frame_rate(&self) -> Option<f64> {
        (**self).frame_rate()
    }

    fn frame_count(&self) -> Option<u64> {
        (**self).frame_count()
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// 列出目录下的所有图片, 按文件名字典序排序
pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, MotError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(MotError::NotADirectory(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|_| MotError::NotADirectory(dir.to_path_buf()))?;
    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image_file(path))
        .collect();
    images.sort();

    if images.is_empty() {
        return Err(MotError::NoImages(dir.to_path_buf()));
    }
    Ok(images)
}

/// 图片序列来源
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    cursor: usize,
    frame_rate: Option<f64>,
}

impl ImageSequence {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            cursor: 0,
            frame_rate: None,
        }
    }

    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, MotError> {
        Ok(Self::new(list_images(dir)?))
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageSequence {
    fn is_opened(&self) -> bool {
        self.cursor < self.paths.len()
    }

    fn read(&mut self) -> Option<RgbImage> {
        let path = self.paths.get(self.cursor)?;
        self.cursor += 1;
        match image::open(path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "⚠️  图片读取失败, 视为流结束");
                self.cursor = self.paths.len();
                None
            }
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }
}

/// 内存帧列表 (已解码的图像)
pub struct FrameList {
    frames: std::vec::IntoIter<RgbImage>,
    frame_rate: Option<f64>,
    total: u64,
}

impl FrameList {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        let total = frames.len() as u64;
        Self {
            frames: frames.into_iter(),
            frame_rate: None,
            total,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }
}

impl FrameSource for FrameList {
    fn is_opened(&self) -> bool {
        self.frames.len() > 0
    }

    fn read(&mut self) -> Option<RgbImage> {
        self.frames.next()
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_list_images_sorted_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.png", "c.Bmp", "notes.txt", "d.jpeg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let images = list_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.JPG", "c.Bmp", "d.jpeg"]);
    }

    #[test]
    fn test_list_images_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(list_images(dir.path()), Err(MotError::NoImages(_))));
        assert!(matches!(
            list_images(dir.path().join("missing")),
            Err(MotError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_image_sequence_reads_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for (i, v) in [10u8, 20, 30].iter().enumerate() {
            RgbImage::from_pixel(4, 4, Rgb([*v, 0, 0]))
                .save(dir.path().join(format!("{:05}.png", i)))
                .unwrap();
        }

        let mut seq = ImageSequence::from_dir(dir.path()).unwrap();
        assert_eq!(seq.frame_count(), Some(3));
        let values: Vec<u8> = std::iter::from_fn(|| seq.read())
            .map(|img| img.get_pixel(0, 0)[0])
            .collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert!(!seq.is_opened());
    }
}
