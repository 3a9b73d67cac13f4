// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 逐帧观察者与评估指标接口

use std::path::Path;

use anyhow::Result;

use crate::config::{DataType, Mode};
use crate::detection::{Frame, FrameResult};

/// 单帧上下文 (只读)
#[derive(Clone, Debug, PartialEq)]
pub struct FrameContext {
    pub mode: Mode,
    pub seq: String,
    /// 从0开始的样本序号
    pub step_id: u64,
    /// 从0开始的帧序号
    pub frame_id: u64,
    /// 截至本帧的平均耗时 (秒)
    pub average_time: f64,
}

impl FrameContext {
    pub fn fps(&self) -> f64 {
        1.0 / self.average_time.max(1e-5)
    }
}

/// 逐帧观察者 (可视化保存、回调等)
pub trait FrameObserver {
    fn on_frame(&mut self, ctx: &FrameContext, frame: &Frame, result: &FrameResult) -> Result<()>;
}

/// 评估指标钩子 (指标计算本身在外部实现)
pub trait MetricHook {
    /// 一个序列结束后调用
    fn update(
        &mut self,
        data_root: &Path,
        seq: &str,
        data_type: DataType,
        result_file: &Path,
    ) -> Result<()>;

    /// 所有序列结束后汇总
    fn accumulate(&mut self);

    fn log(&self);

    fn reset(&mut self);
}
