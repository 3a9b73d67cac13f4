// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ByteTrack 跟踪器 (默认跟踪器实现)
//! ByteTrack: Simple and effective multi-object tracking
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU + 可选外观门限)
//! 3. 低分框救援丢失的轨迹
//! 4. 新轨迹需要连续命中 `n_init` 帧才确认 (序列第一帧除外)

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tracker::Tracker;
use super::types::{Detection, OnlineTrack, Tlwh};

/// ByteTrack 参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ByteTrackConfig {
    pub high_score_threshold: f32,  // 高分检测阈值
    pub low_score_threshold: f32,   // 低分检测阈值 (救援用)
    pub high_iou_threshold: f32,    // 高分匹配 IOU 阈值
    pub low_iou_threshold: f32,     // 低分匹配 IOU 阈值
    pub appearance_threshold: f32,  // 外观余弦距离上限 (双方都有特征时生效)
    pub track_buffer: u32,          // 30fps 下允许丢失的帧数
    pub n_init: u32,                // 确认所需的连续命中次数
    pub embedding_momentum: f32,    // 特征平滑系数
}

impl Default for ByteTrackConfig {
    fn default() -> Self {
        Self {
            high_score_threshold: 0.5,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.3,
            low_iou_threshold: 0.5,
            appearance_threshold: 0.4,
            track_buffer: 30,
            n_init: 2,
            embedding_momentum: 0.9,
        }
    }
}

// ========== 运动模型 ==========

/// 简化卡尔曼滤波器, 对角协方差
/// 状态向量: [cx, cy, w, h, vx, vy, vw, vh]
#[derive(Clone, Debug)]
struct BoxFilter {
    state: [f32; 8],
    p: [f32; 8],
    q: f32,
    r: f32,
}

impl BoxFilter {
    fn new(tlwh: &Tlwh) -> Self {
        let (cx, cy) = tlwh.center();
        Self {
            state: [cx, cy, tlwh.w, tlwh.h, 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q: 0.1,
            r: 0.5,
        }
    }

    fn predict(&mut self) {
        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }
        for p in self.p.iter_mut() {
            *p += self.q;
        }
    }

    fn update(&mut self, tlwh: &Tlwh) {
        let (cx, cy) = tlwh.center();
        let residual = [
            cx - self.state[0],
            cy - self.state[1],
            tlwh.w - self.state[2],
            tlwh.h - self.state[3],
        ];

        for i in 0..4 {
            let k = self.p[i] / (self.p[i] + self.r);
            let kv = self.p[i + 4] / (self.p[i + 4] + self.r * 10.0);
            self.state[i] += k * residual[i];
            self.state[i + 4] += kv * residual[i];
            self.p[i] *= 1.0 - k;
            self.p[i + 4] *= 1.0 - kv;
        }
    }

    fn tlwh(&self) -> Tlwh {
        let w = self.state[2].max(0.0);
        let h = self.state[3].max(0.0);
        Tlwh::new(self.state[0] - w / 2.0, self.state[1] - h / 2.0, w, h)
    }
}

// ========== 轨迹 ==========

#[derive(Clone, Debug)]
struct STrack {
    id: i64,
    filter: BoxFilter,
    tlwh: Tlwh,
    score: f32,
    hits: u32,
    time_since_update: u32,
    confirmed: bool,
    embedding: Option<Vec<f32>>,
}

impl STrack {
    fn new(id: i64, det: &Detection, confirmed: bool) -> Self {
        Self {
            id,
            filter: BoxFilter::new(&det.tlwh),
            tlwh: det.tlwh,
            score: det.score,
            hits: 1,
            time_since_update: 0,
            confirmed,
            embedding: det.embedding.as_deref().map(l2_normalize),
        }
    }

    fn predict(&mut self) {
        self.filter.predict();
        self.time_since_update += 1;
    }

    fn update(&mut self, det: &Detection, n_init: u32, momentum: f32) {
        self.filter.update(&det.tlwh);
        self.tlwh = det.tlwh;
        self.score = det.score;
        self.hits += 1;
        self.time_since_update = 0;
        if self.hits >= n_init {
            self.confirmed = true;
        }

        if let Some(feat) = det.embedding.as_deref() {
            let feat = l2_normalize(feat);
            self.embedding = Some(match self.embedding.take() {
                Some(old) if old.len() == feat.len() => {
                    let mixed: Vec<f32> = old
                        .iter()
                        .zip(&feat)
                        .map(|(o, n)| momentum * o + (1.0 - momentum) * n)
                        .collect();
                    l2_normalize(&mixed)
                }
                _ => feat,
            });
        }
    }

    fn to_online(&self) -> OnlineTrack {
        OnlineTrack {
            track_id: self.id,
            tlwh: self.tlwh,
            score: self.score,
            confirmed: self.confirmed,
            time_since_update: self.time_since_update,
        }
    }
}

fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// 余弦距离 (输入已归一化)
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>()
}

// ========== 跟踪器 ==========

/// ByteTrack 追踪器
pub struct ByteTracker {
    config: ByteTrackConfig,
    tracks: Vec<STrack>,
    next_id: i64,
    max_time_lost: u32,
    frame_count: u64,
    predicted: bool, // 本帧是否已显式预测
}

impl ByteTracker {
    pub fn new(config: ByteTrackConfig) -> Self {
        let max_time_lost = config.track_buffer;
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
            max_time_lost,
            frame_count: 0,
            predicted: false,
        }
    }

    /// IOU 贪心匹配, 返回 (检测下标, 轨迹下标)
    fn match_detections_to_tracks(
        &self,
        detections: &[Detection],
        det_indices: &[usize],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        if det_indices.is_empty() || track_indices.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (local_det, &det_idx) in det_indices.iter().enumerate() {
            let det = &detections[det_idx];
            for (local_track, &track_idx) in track_indices.iter().enumerate() {
                let track = &self.tracks[track_idx];
                let iou = det.tlwh.iou(&track.filter.tlwh());
                if iou < iou_threshold {
                    continue;
                }

                if let (Some(a), Some(b)) = (det.embedding.as_deref(), track.embedding.as_deref()) {
                    if a.len() == b.len()
                        && cosine_distance(&l2_normalize(a), b) > self.config.appearance_threshold
                    {
                        continue;
                    }
                }

                candidates.push((1.0 - iou, det_idx, local_det, track_idx, local_track));
            }
        }

        // 贪心匹配: 按代价排序
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut assignments = Vec::new();
        let mut used_det = vec![false; det_indices.len()];
        let mut used_track = vec![false; track_indices.len()];

        for (_, det_idx, local_det, track_idx, local_track) in candidates {
            if !used_det[local_det] && !used_track[local_track] {
                assignments.push((det_idx, track_idx));
                used_det[local_det] = true;
                used_track[local_track] = true;
            }
        }

        assignments
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(ByteTrackConfig::default())
    }
}

impl Tracker for ByteTracker {
    fn predict(&mut self) {
        for track in &mut self.tracks {
            track.predict();
        }
        self.predicted = true;
    }

    /// 更新跟踪 (三步匹配)
    ///
    /// 返回本帧命中且已确认的轨迹
    fn update(&mut self, detections: &[Detection]) -> Vec<OnlineTrack> {
        if !self.predicted {
            self.predict();
        }
        self.predicted = false;
        self.frame_count += 1;

        // 1. 分离高低分检测框
        let mut high_dets = Vec::new();
        let mut low_dets = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.score >= self.config.high_score_threshold {
                high_dets.push(idx);
            } else if det.score >= self.config.low_score_threshold {
                low_dets.push(idx);
            }
        }

        let n_init = self.config.n_init;
        let momentum = self.config.embedding_momentum;
        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracks.len()];

        // 2. 第一轮匹配: 高分检测 + 所有轨迹
        let all_tracks: Vec<usize> = (0..self.tracks.len()).collect();
        let assignments = self.match_detections_to_tracks(
            detections,
            &high_dets,
            &all_tracks,
            self.config.high_iou_threshold,
        );
        for (det_idx, track_idx) in assignments {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracks[track_idx].update(&detections[det_idx], n_init, momentum);
        }

        // 3. 第二轮匹配: 低分检测 + 未匹配的已确认轨迹 (救援)
        let unmatched_tracks: Vec<usize> = (0..self.tracks.len())
            .filter(|&idx| !matched_track[idx] && self.tracks[idx].confirmed)
            .collect();
        let low_assignments = self.match_detections_to_tracks(
            detections,
            &low_dets,
            &unmatched_tracks,
            self.config.low_iou_threshold,
        );
        for (det_idx, track_idx) in low_assignments {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracks[track_idx].update(&detections[det_idx], n_init, momentum);
        }

        // 4. 未匹配的轨迹: 未确认的直接删除, 已确认的丢失太久才删除
        let max_time_lost = self.max_time_lost;
        let mut idx = 0;
        self.tracks.retain(|t| {
            let keep = matched_track[idx] || (t.confirmed && t.time_since_update <= max_time_lost);
            idx += 1;
            keep
        });

        // 5. 未匹配的高分检测 → 新建轨迹 (第一帧直接确认)
        let first_frame = self.frame_count == 1;
        for &det_idx in &high_dets {
            if !matched_det[det_idx] {
                let track = STrack::new(self.next_id, &detections[det_idx], first_frame || n_init <= 1);
                self.tracks.push(track);
                self.next_id += 1;
            }
        }

        debug!(
            frame = self.frame_count,
            detections = detections.len(),
            tracks = self.tracks.len(),
            "🎯 跟踪更新"
        );

        self.tracks
            .iter()
            .filter(|t| t.confirmed && t.time_since_update == 0)
            .map(STrack::to_online)
            .collect()
    }

    fn set_frame_rate(&mut self, frame_rate: f64) {
        let frame_rate = if frame_rate > 0.0 { frame_rate } else { 30.0 };
        self.max_time_lost = (frame_rate / 30.0 * self.config.track_buffer as f64) as u32;
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
        self.frame_count = 0;
        self.predicted = false;
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
