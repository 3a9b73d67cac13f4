// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 推理循环 (Inference Loop)
//!
//! - JDE / FairMOT: 联合模型 → tracker.update → 分数/几何过滤
//! - DeepSORT:      检测器或检测结果文件 → 裁剪 → ReID → tracker.predict/update
//!
//! DeepSORT 只对检测结果文件做分数过滤, 检测器输出和跟踪结果原样使用
//!
//! 模型调用、跟踪更新、结果写入都在调用线程上按帧顺序执行。

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use super::det_file::DetResults;
use super::observer::{FrameContext, FrameObserver};
use super::timer::Timer;
use crate::config::{Mode, RunConfig};
use crate::detection::{Detection, Frame, FrameResult, Tlwh, Tracker};
use crate::error::MotError;
use crate::input::FramePrefetcher;
use crate::models::{DetectorModel, EmbedderModel, JointDetEmbModel, MotModel};
use crate::preprocess::{get_crops, PreprocessedSample};

/// 单个序列的运行参数
#[derive(Clone, Debug)]
pub struct SeqContext<'a> {
    pub mode: Mode,
    pub seq: &'a str,
    pub draw_threshold: f32,
    pub frame_rate: f64,
    /// 检测器输出是否已经是原图坐标
    pub scaled: bool,
    /// DeepSORT 无检测器时使用
    pub det_results: Option<&'a DetResults>,
}

/// 单个序列的推理结果
#[derive(Clone, Debug, Default)]
pub struct SeqOutput {
    pub results: Vec<FrameResult>,
    pub frames: u64,
    pub average_time: f64,
    pub calls: u64,
}

/// 宽高比/面积过滤: 面积不大于 `min_box_area` 或 `w/h > vertical_ratio` 的框视为噪声
pub fn passes_geometry(tlwh: &Tlwh, min_box_area: f32, vertical_ratio: f32) -> bool {
    if tlwh.area() <= min_box_area {
        return false;
    }
    if vertical_ratio > 0.0 && tlwh.aspect_ratio() > vertical_ratio {
        return false;
    }
    true
}

/// 按模型能力分发到对应的推理循环
pub fn eval_seq(
    model: &mut MotModel,
    tracker: &mut dyn Tracker,
    prefetcher: &FramePrefetcher,
    config: &RunConfig,
    ctx: &SeqContext<'_>,
    observers: &mut [&mut dyn FrameObserver],
) -> Result<SeqOutput> {
    match model {
        MotModel::Joint(model) => {
            eval_seq_jde(model.as_mut(), tracker, prefetcher, config, ctx, observers)
        }
        MotModel::Separate { detector, embedder } => eval_seq_sde(
            detector.as_deref_mut().map(|d| d as &mut dyn DetectorModel),
            embedder.as_mut(),
            tracker,
            prefetcher,
            config,
            ctx,
            observers,
        ),
    }
}

/// JDE / FairMOT 推理循环
pub fn eval_seq_jde(
    model: &mut dyn JointDetEmbModel,
    tracker: &mut dyn Tracker,
    prefetcher: &FramePrefetcher,
    config: &RunConfig,
    ctx: &SeqContext<'_>,
    observers: &mut [&mut dyn FrameObserver],
) -> Result<SeqOutput> {
    tracker.set_frame_rate(ctx.frame_rate);

    let mut timer = Timer::new();
    let mut results = Vec::new();
    let mut frame_id: u64 = 0;

    while let Some(sample) = prefetcher.get_frame() {
        log_progress(frame_id, config.jde_log_interval, &timer);

        timer.tic();
        let detections = model
            .forward(&sample)
            .with_context(|| format!("model forward failed at frame {frame_id}"))?;
        let tracks = tracker.update(&detections);

        let mut result = FrameResult::new(frame_id + 1);
        for t in &tracks {
            if t.score < ctx.draw_threshold {
                continue;
            }
            if !passes_geometry(&t.tlwh, config.min_box_area, config.vertical_ratio) {
                continue;
            }
            result.push(t.tlwh, t.score, t.track_id);
        }
        timer.toc();

        notify(observers, ctx, frame_id, &timer, &sample.frame, &result)?;
        results.push(result);
        frame_id += 1;
    }

    info!(seq = ctx.seq, frames = frame_id, "🏁 预取结束, 推理循环退出");
    Ok(SeqOutput {
        results,
        frames: frame_id,
        average_time: timer.average_time,
        calls: timer.calls,
    })
}

/// DeepSORT 推理循环
pub fn eval_seq_sde(
    mut detector: Option<&mut dyn DetectorModel>,
    embedder: &mut dyn EmbedderModel,
    tracker: &mut dyn Tracker,
    prefetcher: &FramePrefetcher,
    config: &RunConfig,
    ctx: &SeqContext<'_>,
    observers: &mut [&mut dyn FrameObserver],
) -> Result<SeqOutput> {
    if detector.is_none() && ctx.det_results.is_none() {
        return Err(MotError::MissingInput("det_file (DeepSORT without detector)").into());
    }
    tracker.set_frame_rate(ctx.frame_rate);

    let mut timer = Timer::new();
    let mut results = Vec::new();
    let mut frame_id: u64 = 0;

    while let Some(sample) = prefetcher.get_frame() {
        log_progress(frame_id, config.sde_log_interval, &timer);

        timer.tic();
        let (xyxys, scores) = match detector.as_deref_mut() {
            Some(detector) => detector_boxes(detector, &sample, ctx)
                .with_context(|| format!("detector failed at frame {frame_id}"))?,
            None => det_file_boxes(ctx.det_results, frame_id, &sample, ctx.draw_threshold),
        };
        if xyxys.is_empty() {
            warn!(frame = frame_id, "⚠️  当前帧没有目标, 可尝试调整分数阈值");
        }

        let detections = embed_detections(embedder, &sample.frame, &xyxys, &scores, config)
            .with_context(|| format!("ReID failed at frame {frame_id}"))?;

        tracker.predict();
        let tracks = tracker.update(&detections);

        let mut result = FrameResult::new(frame_id + 1);
        for t in &tracks {
            if !t.confirmed || t.time_since_update > 1 {
                continue;
            }
            result.push(t.tlwh, 1.0, t.track_id);
        }
        timer.toc();

        notify(observers, ctx, frame_id, &timer, &sample.frame, &result)?;
        results.push(result);
        frame_id += 1;
    }

    info!(seq = ctx.seq, frames = frame_id, "🏁 预取结束, 推理循环退出");
    Ok(SeqOutput {
        results,
        frames: frame_id,
        average_time: timer.average_time,
        calls: timer.calls,
    })
}

fn log_progress(frame_id: u64, interval: u64, timer: &Timer) {
    if interval > 0 && frame_id % interval == 0 {
        info!(
            "Processing frame {} ({:.2} fps)",
            frame_id,
            timer.fps()
        );
    }
}

fn notify(
    observers: &mut [&mut dyn FrameObserver],
    ctx: &SeqContext<'_>,
    frame_id: u64,
    timer: &Timer,
    frame: &Frame,
    result: &FrameResult,
) -> Result<()> {
    if observers.is_empty() {
        return Ok(());
    }
    let frame_ctx = FrameContext {
        mode: ctx.mode,
        seq: ctx.seq.to_string(),
        step_id: frame_id,
        frame_id,
        average_time: timer.average_time,
    };
    for observer in observers.iter_mut() {
        observer.on_frame(&frame_ctx, frame, result)?;
    }
    Ok(())
}

/// 检测器输出 → 原图坐标 (裁剪后, 去掉零面积框)
fn detector_boxes(
    detector: &mut dyn DetectorModel,
    sample: &PreprocessedSample,
    ctx: &SeqContext<'_>,
) -> Result<(Vec<[f32; 4]>, Vec<f32>)> {
    let rows = detector.detect(sample)?;
    if rows.nrows() > 0 && rows.ncols() < 6 {
        bail!("detector rows need 6 columns, got {}", rows.ncols());
    }

    let mut xyxys = Vec::with_capacity(rows.nrows());
    let mut scores = Vec::with_capacity(rows.nrows());
    for row in rows.outer_iter() {
        let score = row[1];
        let xyxy = [row[2], row[3], row[4], row[5]];
        let xyxy = if ctx.scaled {
            xyxy
        } else {
            sample.meta.to_original_xyxy(xyxy)
        };
        push_clipped(&mut xyxys, &mut scores, sample, xyxy, score);
    }
    Ok((xyxys, scores))
}

/// 检测结果文件 → 原图坐标 (裁剪后, 去掉零面积框)
fn det_file_boxes(
    det_results: Option<&DetResults>,
    frame_id: u64,
    sample: &PreprocessedSample,
    draw_threshold: f32,
) -> (Vec<[f32; 4]>, Vec<f32>) {
    let mut xyxys = Vec::new();
    let mut scores = Vec::new();
    let Some(det_results) = det_results else {
        return (xyxys, scores);
    };

    for record in det_results.frame(frame_id) {
        if record.score < draw_threshold {
            continue;
        }
        push_clipped(&mut xyxys, &mut scores, sample, record.tlwh.to_xyxy(), record.score);
    }
    (xyxys, scores)
}

fn push_clipped(
    xyxys: &mut Vec<[f32; 4]>,
    scores: &mut Vec<f32>,
    sample: &PreprocessedSample,
    xyxy: [f32; 4],
    score: f32,
) {
    let [x1, y1, x2, y2] = sample.meta.clip_xyxy(xyxy);
    if x2 > x1 && y2 > y1 {
        xyxys.push([x1, y1, x2, y2]);
        scores.push(score);
    }
}

/// 裁剪 + ReID, 组装跟踪器输入 (宽高按 `x2 - x1 + 1`)
fn embed_detections(
    embedder: &mut dyn EmbedderModel,
    frame: &Frame,
    xyxys: &[[f32; 4]],
    scores: &[f32],
    config: &RunConfig,
) -> Result<Vec<Detection>> {
    if xyxys.is_empty() {
        return Ok(Vec::new());
    }

    let crops = get_crops(
        xyxys,
        &frame.image,
        scores,
        config.crop_width,
        config.crop_height,
    )?;
    if crops.is_empty() {
        return Ok(Vec::new());
    }

    let embeddings = embedder.embed(&crops.batch)?;
    if embeddings.nrows() != crops.len() {
        bail!(
            "embedder returned {} features for {} crops",
            embeddings.nrows(),
            crops.len()
        );
    }

    let detections = crops
        .kept
        .iter()
        .zip(&crops.scores)
        .zip(embeddings.outer_iter())
        .map(|((&i, &score), feat)| {
            let [x1, y1, x2, y2] = xyxys[i];
            let tlwh = Tlwh::new(x1, y1, x2 - x1 + 1.0, y2 - y1 + 1.0);
            Detection::new(tlwh, score, Some(feat.to_vec()))
        })
        .collect();
    Ok(detections)
}
