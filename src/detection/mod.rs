/// 跟踪系统 (Tracking System)
///
/// - types:     帧/检测框/跟踪结果数据结构
/// - tracker:   跟踪器接口
/// - bytetrack: 默认跟踪器实现
pub mod bytetrack;
pub mod tracker;
pub mod types;

pub use bytetrack::{ByteTrackConfig, ByteTracker};
pub use tracker::{id_to_color, Tracker};
pub use types::{Detection, Frame, FrameResult, OnlineTrack, Tlwh};
