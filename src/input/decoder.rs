// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频文件解码器
/// Video file decoder (ez-ffmpeg, software decoding)
use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{info, warn};

use super::decode_filter::DecodeFilter;
use super::source::FrameSource;
use crate::error::MotError;

/// 解码线程与读取端之间的缓冲帧数
const DECODE_QUEUE: usize = 4;

/// 视频文件来源
pub struct VideoSource {
    rx: Option<Receiver<RgbImage>>,
    opened: bool,
    frame_rate: Option<f64>,
    frame_count: Option<u64>,
    worker: Option<JoinHandle<()>>,
}

impl VideoSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MotError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MotError::NotAFile(path.to_path_buf()));
        }
        let url = path.to_string_lossy().to_string();
        let (frame_rate, frame_count) = probe(&url);
        info!(
            path = %path.display(),
            fps = ?frame_rate,
            frames = ?frame_count,
            "🎬 打开视频"
        );

        let (tx, rx) = bounded(DECODE_QUEUE);
        let worker = thread::Builder::new()
            .name("video-decode".to_string())
            .spawn(move || {
                if let Err(e) = software_decode(&url, DecodeFilter::new(tx)) {
                    warn!(error = %e, "❌ 视频解码失败");
                }
            })
            .map_err(|source| MotError::ThreadSpawn {
                name: "video-decode",
                source,
            })?;

        Ok(Self {
            rx: Some(rx),
            opened: true,
            frame_rate,
            frame_count,
            worker: Some(worker),
        })
    }
}

impl FrameSource for VideoSource {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn read(&mut self) -> Option<RgbImage> {
        let frame = self.rx.as_ref().and_then(|rx| rx.recv().ok());
        if frame.is_none() {
            self.opened = false;
        }
        frame
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        // 先断开接收端, 解码线程发送失败后退出
        self.rx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// 读取视频流信息: (平均帧率, 总帧数)
fn probe(url: &str) -> (Option<f64>, Option<u64>) {
    match find_video_stream_info(url) {
        Ok(Some(StreamInfo::Video {
            avg_frame_rate,
            nb_frames,
            ..
        })) => {
            let fps = (avg_frame_rate.den != 0)
                .then(|| avg_frame_rate.num as f64 / avg_frame_rate.den as f64);
            let count = (nb_frames > 0).then_some(nb_frames as u64);
            (fps, count)
        }
        Ok(_) => (None, None),
        Err(e) => {
            warn!(error = %e, "⚠️ 读取视频信息失败");
            (None, None)
        }
    }
}

/// CPU软件解码, 输出 rgb24
fn software_decode(url: &str, filter: DecodeFilter) -> Result<(), String> {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let ctx = FfmpegContext::builder()
        .input(Input::new(url))
        .filter_descs(["format=rgb24"].into())
        .output(out)
        .build()
        .map_err(|e| format!("构建失败: {}", e))?;

    let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
    sch.wait().map_err(|e| format!("解码中断: {}", e))?;
    Ok(())
}
