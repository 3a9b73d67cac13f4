/// 结果输出 (Result Writer)
///
/// - writer:    MOT / KITTI 文本结果
/// - visualize: 跟踪框绘制
/// - video:     ffmpeg 视频写入 / 图片序列合成
/// - saver:     逐帧保存标注结果 (FrameObserver)
pub mod saver;
pub mod video;
pub mod visualize;
pub mod writer;

pub use saver::FrameSaver;
pub use video::{mux_image_sequence, VideoWriter};
pub use visualize::Annotator;
pub use writer::{format_float, format_frame, write_mot_results};
