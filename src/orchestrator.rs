// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 编排器 (Orchestrator)
//!
//! - mot_predict:  单个视频或图片目录
//! - mot_evaluate: 数据根目录下的多个序列 (`<seq>/img1` + `<seq>/seqinfo.ini`)
//!
//! 每个序列: 重置跟踪器 → 启动预取 → 推理循环 → 写结果 → 合成视频 → 更新指标

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{error, info, warn};

use crate::config::{DataType, Mode, ModelFamily, RunConfig};
use crate::detection::Tracker;
use crate::error::MotError;
use crate::input::{list_images, FramePrefetcher, FrameSource, ImageSequence};
use crate::models::MotModel;
use crate::output::{mux_image_sequence, write_mot_results, Annotator, FrameSaver, VideoWriter};
use crate::pipeline::{
    eval_seq, load_det_results, DetResults, FrameObserver, MetricHook, SeqContext,
};
use crate::preprocess::Preprocessor;

/// 自动帧率 (任何负值都按自动处理)
pub const AUTO_FRAME_RATE: f64 = -1.0;

/// 视频帧率的合理范围上限, 超过视为探测失败
const MAX_CAPTURE_FPS: f64 = 1000.0;

/// 评估时保留所有跟踪结果, 不使用 `draw_threshold`
const EVAL_DRAW_THRESHOLD: f32 = 0.0;

/// 跟踪任务参数 (预测/评估共用)
#[derive(Clone, Debug)]
pub struct TrackOptions {
    pub output_dir: PathBuf,
    pub data_type: DataType,
    pub model_family: ModelFamily,
    pub save_images: bool,
    pub save_videos: bool,
    pub show_image: bool,
    /// 检测器输出是否已经是原图坐标
    pub scaled: bool,
    /// DeepSORT 检测结果目录 (`<dir>/<seq>.txt`)
    pub det_results_dir: Option<PathBuf>,
    /// 分数阈值 (只用于 mot_predict)
    pub draw_threshold: f32,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            data_type: DataType::Mot,
            model_family: ModelFamily::Jde,
            save_images: false,
            save_videos: false,
            show_image: false,
            scaled: false,
            det_results_dir: None,
            draw_threshold: 0.5,
        }
    }
}

/// 单个序列的运行结果
#[derive(Clone, Debug)]
pub struct SeqSummary {
    pub seq: String,
    pub frames: u64,
    pub average_time: f64,
    pub calls: u64,
    pub frame_rate: f64,
    pub result_file: PathBuf,
    /// 输出视频 (直接写入或图片序列合成)
    pub video: Option<PathBuf>,
    /// 视频合成失败原因
    pub mux_error: Option<String>,
}

/// 一次运行的汇总
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub seqs: Vec<SeqSummary>,
    /// Σ average_time × calls (秒)
    pub total_time: f64,
    pub fps: f64,
}

impl RunSummary {
    fn from_seqs(seqs: Vec<SeqSummary>) -> Self {
        let total_time: f64 = seqs.iter().map(|s| s.average_time * s.calls as f64).sum();
        let calls: u64 = seqs.iter().map(|s| s.calls).sum();
        let fps = if total_time > 0.0 {
            calls as f64 / total_time
        } else {
            0.0
        };
        Self {
            seqs,
            total_time,
            fps,
        }
    }

    pub fn frames(&self) -> u64 {
        self.seqs.iter().map(|s| s.frames).sum()
    }
}

/// 序列名: 文件名/目录名中第一个 `.` 之前的部分
pub fn seq_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

/// 从 `seqinfo.ini` 内容中读取 `frameRate`
pub fn parse_seqinfo_frame_rate(text: &str) -> Option<f64> {
    let re = Regex::new(r"(?m)^\s*frameRate\s*=\s*(\d+(?:\.\d+)?)").ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// 列出推理图片 (按文件名排序)
pub fn get_infer_images(infer_dir: &Path) -> Result<Vec<PathBuf>, MotError> {
    let images = list_images(infer_dir)?;
    info!("Found {} inference images in total.", images.len());
    Ok(images)
}

/// 编排器: 持有模型、跟踪器、观察者与指标钩子
pub struct Orchestrator {
    mode: Mode,
    model: MotModel,
    tracker: Box<dyn Tracker>,
    config: RunConfig,
    preprocessor: Preprocessor,
    observers: Vec<Box<dyn FrameObserver>>,
    metrics: Vec<Box<dyn MetricHook>>,
    font: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        mode: Mode,
        model: MotModel,
        tracker: Box<dyn Tracker>,
        config: RunConfig,
    ) -> Result<Self, MotError> {
        let preprocessor = Preprocessor::new(config.preprocess.clone())?;
        Ok(Self {
            mode,
            model,
            tracker,
            config,
            preprocessor,
            observers: Vec::new(),
            metrics: Vec::new(),
            font: None,
        })
    }

    /// 标注字体 (ttf/otf)
    pub fn with_font(mut self, font: impl Into<PathBuf>) -> Self {
        self.font = Some(font.into());
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn FrameObserver>) {
        self.observers.push(observer);
    }

    /// 评估指标 (只在 eval 模式下更新)
    pub fn add_metric(&mut self, metric: Box<dyn MetricHook>) {
        self.metrics.push(metric);
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// 对单个视频或图片目录做跟踪推理
    ///
    /// `frame_rate` 为 [`AUTO_FRAME_RATE`] 时从视频读取 (失败或越界时为 25.01),
    /// 图片目录默认 30
    pub fn mot_predict(
        &mut self,
        video_file: Option<&Path>,
        image_dir: Option<&Path>,
        frame_rate: f64,
        opts: &TrackOptions,
    ) -> Result<RunSummary> {
        self.model.check_family(opts.model_family)?;

        let (seq, source, is_video) = match (video_file, image_dir) {
            (Some(video), _) => {
                info!("Starting tracking video {}", video.display());
                (seq_name(video), open_video(video)?, true)
            }
            (None, Some(dir)) => {
                let images = get_infer_images(dir)?;
                info!(
                    "Starting tracking folder {}, found {} images",
                    dir.display(),
                    images.len()
                );
                let source: Box<dyn FrameSource> = Box::new(ImageSequence::new(images));
                (seq_name(dir), source, false)
            }
            (None, None) => return Err(MotError::MissingInput("video_file or image_dir").into()),
        };

        let result_root = prepare_output_dirs(&opts.output_dir)?;
        let frame_rate = if frame_rate < 0.0 {
            self.auto_frame_rate(source.frame_rate(), is_video)
        } else {
            frame_rate
        };

        // 视频输入直接写视频, 图片目录写图片序列后合成
        let direct_video = (opts.save_videos && is_video)
            .then(|| opts.output_dir.join(format!("{seq}_vis.mp4")));

        let summary = self.run_seq(
            &seq,
            source,
            frame_rate,
            opts.draw_threshold,
            direct_video,
            &result_root,
            opts,
        )?;
        let run = RunSummary::from_seqs(vec![summary]);
        log_timing(&run);
        Ok(run)
    }

    /// 评估 `data_root` 下的多个序列
    ///
    /// 缺少 `seqinfo.ini` 或 `img1/` 的序列跳过并告警; 分数阈值固定为 0
    pub fn mot_evaluate(
        &mut self,
        data_root: &Path,
        seqs: &[String],
        opts: &TrackOptions,
    ) -> Result<RunSummary> {
        self.model.check_family(opts.model_family)?;
        let result_root = prepare_output_dirs(&opts.output_dir)?;

        let mut summaries = Vec::with_capacity(seqs.len());
        for seq in seqs {
            let seq_dir = data_root.join(seq);
            if !seq_dir.is_dir() {
                warn!(seq = %seq, "⚠️  序列目录不存在, 跳过");
                continue;
            }
            let infer_dir = seq_dir.join("img1");
            let seqinfo = seq_dir.join("seqinfo.ini");
            if !seqinfo.is_file() || !infer_dir.is_dir() {
                warn!(seq = %seq, "⚠️  缺少 seqinfo.ini 或 img1/, 跳过");
                continue;
            }
            let info_text = fs::read_to_string(&seqinfo)
                .with_context(|| format!("failed to read {}", seqinfo.display()))?;
            let Some(frame_rate) = parse_seqinfo_frame_rate(&info_text) else {
                warn!(seq = %seq, "⚠️  seqinfo.ini 中没有 frameRate, 跳过");
                continue;
            };

            info!("start seq: {}", seq);
            let images = get_infer_images(&infer_dir)?;
            let source: Box<dyn FrameSource> = Box::new(ImageSequence::new(images));
            let summary = self.run_seq(
                seq,
                source,
                frame_rate,
                EVAL_DRAW_THRESHOLD,
                None,
                &result_root,
                opts,
            )?;

            info!("Evaluate seq: {}", seq);
            if self.mode == Mode::Eval {
                for metric in self.metrics.iter_mut() {
                    metric.update(data_root, seq, opts.data_type, &summary.result_file)?;
                }
            }
            summaries.push(summary);
        }

        let run = RunSummary::from_seqs(summaries);
        log_timing(&run);

        if self.mode == Mode::Eval {
            for metric in self.metrics.iter_mut() {
                metric.accumulate();
                metric.log();
            }
            // 指标可能被多次使用
            for metric in self.metrics.iter_mut() {
                metric.reset();
            }
        }
        Ok(run)
    }

    fn auto_frame_rate(&self, probed: Option<f64>, is_video: bool) -> f64 {
        if !is_video {
            return probed.unwrap_or(self.config.image_dir_frame_rate);
        }
        match probed {
            Some(fps) if fps > 0.0 && fps <= MAX_CAPTURE_FPS => fps,
            _ => {
                warn!(
                    probed = ?probed,
                    "⚠️  视频帧率无效, 使用 {}",
                    self.config.fallback_frame_rate
                );
                self.config.fallback_frame_rate
            }
        }
    }

    fn load_det_file(
        &self,
        seq: &str,
        num_frames: Option<u64>,
        opts: &TrackOptions,
    ) -> Result<Option<DetResults>, MotError> {
        if self.model.is_joint() || self.model.has_detector() {
            return Ok(None);
        }
        let dir = opts
            .det_results_dir
            .as_ref()
            .ok_or(MotError::MissingInput("det_results_dir (DeepSORT without detector)"))?;
        let results = load_det_results(
            dir.join(format!("{seq}.txt")),
            num_frames.map(|n| n as usize),
        )?;
        Ok(Some(results))
    }

    fn frame_saver(
        &self,
        seq: &str,
        frame_rate: f64,
        direct_video: Option<PathBuf>,
        opts: &TrackOptions,
    ) -> Result<FrameSaver> {
        let annotator = match &self.font {
            Some(font) => Annotator::with_font_file(font)?,
            None => Annotator::new(),
        };
        let mut saver = FrameSaver::new(annotator).with_show_image(opts.show_image);
        if opts.save_images || opts.save_videos {
            saver = saver.with_save_dir(opts.output_dir.join("mot_outputs").join(seq));
        }
        if let Some(path) = direct_video {
            info!("Save video in {}", path.display());
            saver = saver
                .with_video(VideoWriter::new(path, frame_rate).with_program(&self.config.ffmpeg));
        }
        Ok(saver)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_seq(
        &mut self,
        seq: &str,
        source: Box<dyn FrameSource>,
        frame_rate: f64,
        draw_threshold: f32,
        direct_video: Option<PathBuf>,
        result_root: &Path,
        opts: &TrackOptions,
    ) -> Result<SeqSummary> {
        let det_results = self.load_det_file(seq, source.frame_count(), opts)?;
        let mut saver = self.frame_saver(seq, frame_rate, direct_video, opts)?;

        self.tracker.reset();
        let prefetcher =
            FramePrefetcher::spawn(source, self.preprocessor.clone(), self.config.buffer_size)?;

        let ctx = SeqContext {
            mode: self.mode,
            seq,
            draw_threshold,
            frame_rate,
            scaled: opts.scaled,
            det_results: det_results.as_ref(),
        };

        let output = {
            let mut observers: Vec<&mut dyn FrameObserver> =
                Vec::with_capacity(self.observers.len() + 1);
            observers.push(&mut saver);
            for observer in self.observers.iter_mut() {
                observers.push(observer.as_mut());
            }
            eval_seq(
                &mut self.model,
                self.tracker.as_mut(),
                &prefetcher,
                &self.config,
                &ctx,
                &mut observers,
            )
            .with_context(|| format!("sequence {seq} failed"))?
        };
        drop(prefetcher);

        let result_file = result_root.join(format!("{seq}.txt"));
        write_mot_results(&result_file, &output.results, opts.data_type)?;

        let mut video = None;
        let mut mux_error = None;
        match saver.finish() {
            Ok(Some(path)) => video = Some(path),
            Ok(None) => {}
            Err(e) => {
                error!("❌ 视频写入失败: {:#}", e);
                mux_error = Some(format!("{e:#}"));
            }
        }

        if opts.save_videos && video.is_none() && saver.saved() > 0 {
            if let Some(save_dir) = saver.save_dir() {
                let path = opts
                    .output_dir
                    .join("mot_outputs")
                    .join(format!("{seq}_vis.mp4"));
                match mux_image_sequence(&self.config.ffmpeg, save_dir, &path, frame_rate) {
                    Ok(()) => video = Some(path),
                    Err(e) => {
                        error!("❌ {}", e);
                        mux_error = Some(e.to_string());
                    }
                }
            }
        }

        Ok(SeqSummary {
            seq: seq.to_string(),
            frames: output.frames,
            average_time: output.average_time,
            calls: output.calls,
            frame_rate,
            result_file,
            video,
            mux_error,
        })
    }
}

fn prepare_output_dirs(output_dir: &Path) -> Result<PathBuf> {
    let result_root = output_dir.join("mot_results");
    fs::create_dir_all(&result_root)
        .with_context(|| format!("failed to create {}", result_root.display()))?;
    Ok(result_root)
}

fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, MotError> {
    if !path.is_file() {
        return Err(MotError::NotAFile(path.to_path_buf()));
    }
    #[cfg(feature = "ffmpeg")]
    {
        Ok(Box::new(crate::input::VideoSource::open(path)?))
    }
    #[cfg(not(feature = "ffmpeg"))]
    {
        Err(MotError::VideoUnsupported(path.to_path_buf()))
    }
}

fn log_timing(run: &RunSummary) {
    info!(
        "Time elapsed: {:.2} seconds, FPS: {:.2}",
        run.total_time, run.fps
    );
}
