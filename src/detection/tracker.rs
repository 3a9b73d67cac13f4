// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 多目标跟踪公共接口
//! Common interface for multi-object tracking
//!
//! 卡尔曼预测、数据关联、轨迹生命周期都属于跟踪器本身;
//! 推理循环只调用这里定义的接口。

use super::types::{Detection, OnlineTrack};

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
///
/// JDE/FairMOT/DeepSORT 等跟踪算法都应实现此接口
pub trait Tracker {
    /// 预测下一帧状态
    ///
    /// 两阶段 (DeepSORT) 流程在 `update` 之前显式调用;
    /// 单阶段流程只调用 `update`, 实现需要自行完成预测。
    fn predict(&mut self) {}

    /// 更新跟踪器
    ///
    /// # 参数
    /// - `detections`: 当前帧的检测框 (原图坐标, 可带ReID特征)
    ///
    /// # 返回
    /// 当前帧的在线目标
    fn update(&mut self, detections: &[Detection]) -> Vec<OnlineTrack>;

    /// 按视频帧率调整最大丢失帧数
    fn set_frame_rate(&mut self, _frame_rate: f64) {}

    /// 重置跟踪器 (清除所有跟踪, 每个序列开始时调用)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

impl<T: Tracker + ?Sized> Tracker for Box<T> {
    fn predict(&mut self) {
        (**self).predict()
    }

    fn update(&mut self, detections: &[Detection]) -> Vec<OnlineTrack> {
        (**self).update(detections)
    }

    fn set_frame_rate(&mut self, frame_rate: f64) {
        (**self).set_frame_rate(frame_rate)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn track_count(&self) -> usize {
        (**self).track_count()
    }
}

// ========== 工具函数 ==========

/// 根据跟踪ID生成颜色 (与评估工具的可视化保持一致)
pub fn id_to_color(id: i64) -> (u8, u8, u8) {
    let idx = id.unsigned_abs() * 3;
    (
        ((37 * idx) % 255) as u8,
        ((17 * idx) % 255) as u8,
        ((29 * idx) % 255) as u8,
    )
}
