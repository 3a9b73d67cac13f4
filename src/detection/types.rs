// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 多目标跟踪数据结构定义
/// Data structures for multi-object tracking
use std::sync::Arc;

use image::RgbImage;

// ========== 数据结构 ==========

/// 原始帧 (采集 → 预处理 → 推理)
///
/// 采集后不可变, 图像数据通过Arc共享
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64, // 帧序号 (从0开始)
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 检测框 (左上角 + 宽高)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tlwh {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Tlwh {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// 从角点坐标构造
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            w: x2 - x1,
            h: y2 - y1,
        }
    }

    pub fn to_xyxy(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.w, self.y + self.h]
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// 宽高比 (w / h)
    pub fn aspect_ratio(&self) -> f32 {
        self.w / self.h
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// 计算两个框的IOU (Intersection over Union)
    pub fn iou(&self, other: &Tlwh) -> f32 {
        let [ax1, ay1, ax2, ay2] = self.to_xyxy();
        let [bx1, by1, bx2, by2] = other.to_xyxy();
        let x1 = ax1.max(bx1);
        let y1 = ay1.max(by1);
        let x2 = ax2.min(bx2);
        let y2 = ay2.min(by2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }
}

/// 单帧检测结果 (检测器 → 跟踪器)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub tlwh: Tlwh,
    pub score: f32,
    pub embedding: Option<Vec<f32>>, // ReID特征 (可选)
}

impl Detection {
    pub fn new(tlwh: Tlwh, score: f32, embedding: Option<Vec<f32>>) -> Self {
        Self {
            tlwh,
            score,
            embedding,
        }
    }
}

/// 跟踪器输出的在线目标
///
/// `track_id` 由跟踪器分配, 这里只读不改; 负数表示未确认/无效
#[derive(Clone, Debug, PartialEq)]
pub struct OnlineTrack {
    pub track_id: i64,
    pub tlwh: Tlwh,
    pub score: f32,
    pub confirmed: bool,
    pub time_since_update: u32,
}

/// 单帧跟踪结果 (推理循环 → 结果写入)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameResult {
    pub frame_id: u64, // 从1开始
    pub tlwhs: Vec<Tlwh>,
    pub scores: Vec<f32>,
    pub ids: Vec<i64>,
}

impl FrameResult {
    pub fn new(frame_id: u64) -> Self {
        Self {
            frame_id,
            ..Default::default()
        }
    }

    pub fn push(&mut self, tlwh: Tlwh, score: f32, id: i64) {
        self.tlwhs.push(tlwh);
        self.scores.push(score);
        self.ids.push(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
