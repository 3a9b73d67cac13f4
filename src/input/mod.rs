/// 视频输入系统 (Video Input System)
///
/// - FrameSource:     帧来源接口 (图片目录 / 视频文件)
/// - FramePrefetcher: 后台预取 + 预处理, 有界队列
/// - VideoSource:     FFmpeg 视频解码 (需要 `ffmpeg` 特性)
pub mod prefetcher;
pub mod source;

#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;

pub use prefetcher::{CancelToken, FramePrefetcher};
pub use source::{
    is_image_file, list_images, FrameList, FrameSource, ImageSequence, IMAGE_EXTENSIONS,
};

#[cfg(feature = "ffmpeg")]
pub use decoder::VideoSource;
