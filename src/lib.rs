// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行配置参数
pub mod detection; // 检测/跟踪数据类型与默认跟踪器
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod models; // 模型接口与 ONNX 实现
pub mod orchestrator; // 预测/评估编排
pub mod output; // 结果输出
pub mod pipeline; // 推理流水线
pub mod preprocess; // 帧预处理

pub use crate::config::{DataType, Mode, ModelFamily, RunConfig};
pub use crate::detection::{ByteTracker, Detection, Frame, FrameResult, OnlineTrack, Tlwh, Tracker};
pub use crate::error::MotError;
pub use crate::models::MotModel;
pub use crate::orchestrator::{Orchestrator, RunSummary, SeqSummary, TrackOptions};

/// 生成时间字符串 (北京时间), 用于输出目录命名
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    match chrono::FixedOffset::east_opt(8 * 60 * 60) {
        Some(offset) => chrono::Utc::now().with_timezone(&offset).format(&fmt).to_string(),
        None => chrono::Utc::now().format(&fmt).to_string(),
    }
}
