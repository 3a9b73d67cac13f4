// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg解码过滤器模块
/// FFmpeg decode filter: rgb24 帧 → RgbImage → 有界通道
use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, warn};

/// 解码过滤器: 滤镜图已输出 rgb24, 这里只做逐行拷贝
pub struct DecodeFilter {
    tx: Sender<RgbImage>,
    pub total_frames: usize,
    pub dropped_frames: usize,
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>) -> Self {
        Self {
            tx,
            total_frames: 0,
            dropped_frames: 0,
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        unsafe {
            self.total_frames += 1;

            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.dropped_frames += 1;
                warn!(frame = self.total_frames, "⚠️ 丢弃帧: 空帧/损坏帧");
                return Ok(None);
            }

            let w = (*frame.as_ptr()).width as usize;
            let h = (*frame.as_ptr()).height as usize;
            let data = (*frame.as_ptr()).data[0];
            let stride = (*frame.as_ptr()).linesize[0] as usize;

            if w == 0 || h == 0 || data.is_null() || stride < w * 3 {
                self.dropped_frames += 1;
                warn!(frame = self.total_frames, w, h, stride, "⚠️ 丢弃帧: 非法尺寸/步长");
                return Ok(None);
            }

            let mut raw = Vec::with_capacity(w * h * 3);
            for row in 0..h {
                let line = std::slice::from_raw_parts(data.add(row * stride), w * 3);
                raw.extend_from_slice(line);
            }

            let Some(image) = RgbImage::from_raw(w as u32, h as u32, raw) else {
                self.dropped_frames += 1;
                return Ok(None);
            };

            // 阻塞发送: 下游消费慢时解码线程自然减速
            if self.tx.send(image).is_err() {
                return Err("frame receiver dropped".to_string());
            }

            Ok(Some(frame))
        }
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        debug!(
            total = self.total_frames,
            dropped = self.dropped_frames,
            "✅ 解码线程退出"
        );
    }
}
