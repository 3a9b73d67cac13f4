// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪结果可视化

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detection::{id_to_color, FrameResult};

/// 标注字体 (可选, 没有字体时只画框)
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new() -> Self {
        Self { font: None }
    }

    /// 从 ttf/otf 文件加载字体
    pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 在图像上绘制跟踪框/ID/分数, 左上角标注 `frame / fps / num`
    pub fn plot_tracking(&self, image: &RgbImage, result: &FrameResult, fps: f64) -> RgbImage {
        let mut canvas = image.clone();
        let (w, h) = canvas.dimensions();
        let text_scale = (w as f32 / 1600.0).max(1.0);
        let thickness = (w as f32 / 500.0).max(1.0) as i32;

        if let Some(font) = &self.font {
            let header = format!(
                "frame: {} fps: {:.2} num: {}",
                result.frame_id,
                fps,
                result.len()
            );
            draw_text_mut(
                &mut canvas,
                Rgb([255, 0, 0]),
                0,
                0,
                PxScale::from(18.0 * text_scale),
                font,
                &header,
            );
        }

        for ((tlwh, score), &id) in result.tlwhs.iter().zip(&result.scores).zip(&result.ids) {
            let (x1, y1) = (tlwh.x as i32, tlwh.y as i32);
            let (bw, bh) = (tlwh.w.max(1.0) as u32, tlwh.h.max(1.0) as u32);
            if x1 >= w as i32 || y1 >= h as i32 {
                continue;
            }
            let (r, g, b) = id_to_color(id);
            let color = Rgb([r, g, b]);

            for t in 0..thickness {
                let bw = bw.saturating_sub(2 * t as u32).max(1);
                let bh = bh.saturating_sub(2 * t as u32).max(1);
                draw_hollow_rect_mut(&mut canvas, Rect::at(x1 + t, y1 + t).of_size(bw, bh), color);
            }

            if let Some(font) = &self.font {
                let label = format!("{id}, {score:.2}");
                draw_text_mut(
                    &mut canvas,
                    Rgb([255, 0, 0]),
                    x1,
                    (y1 - 18).max(0),
                    PxScale::from(16.0 * text_scale),
                    font,
                    &label,
                );
            }
        }
        canvas
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}
