// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use super::video::VideoWriter;
use super::visualize::Annotator;
use crate::detection::{Frame, FrameResult};
use crate::pipeline::{FrameContext, FrameObserver};

/// 逐帧保存标注结果: 视频写入器优先, 否则写 `save_dir/{frame:05}.jpg`
pub struct FrameSaver {
    annotator: Annotator,
    save_dir: Option<PathBuf>,
    video: Option<VideoWriter>,
    show_image: bool,
    warned_show: bool,
    saved: u64,
}

impl FrameSaver {
    pub fn new(annotator: Annotator) -> Self {
        Self {
            annotator,
            save_dir: None,
            video: None,
            show_image: false,
            warned_show: false,
            saved: 0,
        }
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    pub fn with_video(mut self, writer: VideoWriter) -> Self {
        self.video = Some(writer);
        self
    }

    pub fn with_show_image(mut self, show: bool) -> Self {
        self.show_image = show;
        self
    }

    pub fn save_dir(&self) -> Option<&Path> {
        self.save_dir.as_deref()
    }

    pub fn saved(&self) -> u64 {
        self.saved
    }

    /// 是否需要渲染
    pub fn is_active(&self) -> bool {
        self.save_dir.is_some() || self.video.is_some() || self.show_image
    }

    /// 结束视频写入, 返回视频路径 (如有)
    pub fn finish(&mut self) -> Result<Option<PathBuf>> {
        match self.video.take() {
            Some(mut writer) => {
                writer.finish()?;
                Ok(Some(writer.path().to_path_buf()))
            }
            None => Ok(None),
        }
    }

    fn save_image(&self, ctx: &FrameContext, image: &image::RgbImage) -> Result<()> {
        let Some(dir) = &self.save_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!("{:05}.jpg", ctx.frame_id));
        image
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        Ok(())
    }
}

impl FrameObserver for FrameSaver {
    fn on_frame(&mut self, ctx: &FrameContext, frame: &Frame, result: &FrameResult) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        if self.show_image && !self.warned_show {
            warn!("⚠️  show_image 没有可用的窗口后端, 已忽略");
            self.warned_show = true;
        }
        if self.save_dir.is_none() && self.video.is_none() {
            return Ok(());
        }

        let annotated = self
            .annotator
            .plot_tracking(&frame.image, result, ctx.fps());

        if let Some(writer) = self.video.as_mut() {
            match writer.write(&annotated) {
                Ok(()) => {
                    self.saved += 1;
                    return Ok(());
                }
                Err(e) => {
                    // 编码器不可用时退回图片序列
                    warn!("⚠️  {}, 改为保存图片序列", e);
                    self.video = None;
                }
            }
        }

        if self.save_dir.is_some() {
            self.save_image(ctx, &annotated)?;
            self.saved += 1;
        }
        Ok(())
    }
}
