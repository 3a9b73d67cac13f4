// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use image::{Rgb, RgbImage};
use ndarray::Array3;

use mot_infer_rs::detection::{ByteTracker, Detection, OnlineTrack, Tlwh, Tracker};
use mot_infer_rs::input::{FramePrefetcher, FrameSource};
use mot_infer_rs::models::{JointDetEmbModel, MotModel};
use mot_infer_rs::orchestrator::{Orchestrator, TrackOptions};
use mot_infer_rs::preprocess::{create_inputs, PreprocessedSample, Preprocessor, SampleMeta};
use mot_infer_rs::{DataType, Mode, ModelFamily, MotError, RunConfig};

/// 第 `fail_at` 次读取失败的来源 (帧像素值为读取序号)
struct FlakySource {
    total: usize,
    fail_at: usize,
    reads: Arc<AtomicUsize>,
}

impl FrameSource for FlakySource {
    fn is_opened(&self) -> bool {
        true
    }

    fn read(&mut self) -> Option<RgbImage> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_at || n > self.total {
            return None;
        }
        Some(RgbImage::from_pixel(8, 8, Rgb([n as u8, 0, 0])))
    }
}

#[test]
fn test_prefetcher_stops_at_failed_read() {
    let reads = Arc::new(AtomicUsize::new(0));
    let source = FlakySource {
        total: 5,
        fail_at: 3,
        reads: reads.clone(),
    };
    let prefetcher = FramePrefetcher::spawn(source, Preprocessor::new(Vec::new()).unwrap(), 2).unwrap();

    let mut seen = Vec::new();
    while let Some(sample) = prefetcher.get_frame() {
        seen.push(sample.frame.image.get_pixel(0, 0)[0]);
    }
    assert_eq!(seen, vec![1, 2]);
    assert!(prefetcher.get_frame().is_none());

    thread::sleep(Duration::from_millis(30));
    assert_eq!(reads.load(Ordering::SeqCst), 3);
}

#[test]
fn test_batch_padding_scenario() {
    let shapes = [(100, 100), (120, 80), (90, 130)];
    let mut images = Vec::new();
    let mut metas = Vec::new();
    for (i, &(h, w)) in shapes.iter().enumerate() {
        images.push(Array3::<f32>::from_elem((3, h, w), i as f32 + 1.0));
        metas.push(SampleMeta::from_image(&RgbImage::new(w as u32, h as u32)));
    }

    let batch = create_inputs(images, &metas).unwrap();
    assert_eq!(batch.image.shape(), &[3, 3, 120, 130]);

    // 每张图在左上角, 其余补零
    for (i, &(h, w)) in shapes.iter().enumerate() {
        let v = i as f32 + 1.0;
        assert_eq!(batch.image[[i, 0, 0, 0]], v);
        assert_eq!(batch.image[[i, 2, h - 1, w - 1]], v);
        if w < 130 {
            assert_eq!(batch.image[[i, 0, 0, w]], 0.0);
        }
        if h < 120 {
            assert_eq!(batch.image[[i, 1, h, 0]], 0.0);
        }
    }
    assert_eq!(batch.im_shape[[2, 0]], 90.0);
    assert_eq!(batch.im_shape[[2, 1]], 130.0);
}

/// 每帧返回两个固定框: 一个正常, 一个宽高比过大
struct StaticJoint;

impl JointDetEmbModel for StaticJoint {
    fn forward(&mut self, _sample: &PreprocessedSample) -> Result<Vec<Detection>> {
        Ok(vec![
            Detection::new(Tlwh::new(10.0, 5.0, 20.0, 30.0), 0.9, Some(vec![1.0, 0.0])),
            Detection::new(Tlwh::new(0.0, 40.0, 60.0, 20.0), 0.9, Some(vec![0.0, 1.0])),
        ])
    }
}

fn write_images(dir: &Path, n: usize) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..n {
        RgbImage::from_pixel(64, 64, Rgb([40, 40, 40]))
            .save(dir.join(format!("{:06}.png", i + 1)))
            .unwrap();
    }
}

fn orchestrator(mode: Mode) -> Orchestrator {
    let config = RunConfig {
        preprocess: Vec::new(),
        buffer_size: 2,
        ..RunConfig::default()
    };
    Orchestrator::new(
        mode,
        MotModel::joint(StaticJoint),
        Box::new(ByteTracker::default()),
        config,
    )
    .unwrap()
}

#[test]
fn test_predict_image_dir_writes_mot_results() {
    let tmp = tempfile::tempdir().unwrap();
    let image_dir = tmp.path().join("MOT16-02.frames");
    write_images(&image_dir, 3);
    let opts = TrackOptions {
        output_dir: tmp.path().join("output"),
        save_images: true,
        ..TrackOptions::default()
    };

    let mut orch = orchestrator(Mode::Test);
    let run = orch.mot_predict(None, Some(image_dir.as_path()), -1.0, &opts).unwrap();

    assert_eq!(run.seqs.len(), 1);
    let seq = &run.seqs[0];
    assert_eq!(seq.seq, "MOT16-02");
    assert_eq!(seq.frames, 3);
    assert_eq!(seq.frame_rate, 30.0);
    assert_eq!(seq.result_file, opts.output_dir.join("mot_results").join("MOT16-02.txt"));

    let text = fs::read_to_string(&seq.result_file).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    for (i, line) in lines.iter().enumerate() {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[0], (i + 1).to_string());
        assert_eq!(fields[1], "1");
        assert_eq!(&fields[7..], ["-1", "-1", "-1"]);
    }

    let frames_dir = opts.output_dir.join("mot_outputs").join("MOT16-02");
    for name in ["00000.jpg", "00001.jpg", "00002.jpg"] {
        assert!(frames_dir.join(name).is_file());
    }
}

#[test]
fn test_predict_kitti_format() {
    let tmp = tempfile::tempdir().unwrap();
    let image_dir = tmp.path().join("seq");
    write_images(&image_dir, 2);
    let opts = TrackOptions {
        output_dir: tmp.path().join("output"),
        data_type: DataType::Kitti,
        ..TrackOptions::default()
    };

    let mut orch = orchestrator(Mode::Test);
    let run = orch.mot_predict(None, Some(image_dir.as_path()), 25.0, &opts).unwrap();
    assert_eq!(run.seqs[0].frame_rate, 25.0);

    let text = fs::read_to_string(&run.seqs[0].result_file).unwrap();
    let first = text.lines().next().unwrap();
    assert!(first.starts_with("0 1 car 0 0 -10 "), "{first}");
    assert!(first.ends_with(" -10 -10 -10 -1000 -1000 -1000 -10"));
}

#[test]
fn test_evaluate_skips_incomplete_sequences() {
    let tmp = tempfile::tempdir().unwrap();
    let data_root = tmp.path().join("MOT16").join("train");

    let good = data_root.join("MOT16-02");
    write_images(&good.join("img1"), 2);
    fs::write(
        good.join("seqinfo.ini"),
        "[Sequence]\nname=MOT16-02\nimDir=img1\nframeRate=25\nseqLength=2\n",
    )
    .unwrap();

    // 没有 seqinfo.ini
    write_images(&data_root.join("MOT16-04").join("img1"), 2);

    let opts = TrackOptions {
        output_dir: tmp.path().join("output"),
        ..TrackOptions::default()
    };
    let seqs = vec![
        "MOT16-02".to_string(),
        "MOT16-04".to_string(),
        "MOT16-09".to_string(),
    ];

    let mut orch = orchestrator(Mode::Eval);
    let run = orch.mot_evaluate(&data_root, &seqs, &opts).unwrap();

    assert_eq!(run.seqs.len(), 1);
    assert_eq!(run.seqs[0].seq, "MOT16-02");
    assert_eq!(run.seqs[0].frame_rate, 25.0);
    assert_eq!(run.frames(), 2);
    assert!(opts.output_dir.join("mot_results").join("MOT16-02.txt").is_file());
    assert!(!opts.output_dir.join("mot_results").join("MOT16-04.txt").exists());
}

/// 每帧两个检测: 高分 0.9 与低分 0.3
struct MixedScoreJoint;

impl JointDetEmbModel for MixedScoreJoint {
    fn forward(&mut self, _sample: &PreprocessedSample) -> Result<Vec<Detection>> {
        Ok(vec![
            Detection::new(Tlwh::new(5.0, 5.0, 20.0, 40.0), 0.9, None),
            Detection::new(Tlwh::new(30.0, 5.0, 20.0, 40.0), 0.3, None),
        ])
    }
}

/// 每个检测直接成为已确认轨迹 (ID 为下标 + 1)
struct EchoTracker;

impl Tracker for EchoTracker {
    fn update(&mut self, detections: &[Detection]) -> Vec<OnlineTrack> {
        detections
            .iter()
            .enumerate()
            .map(|(i, d)| OnlineTrack {
                track_id: i as i64 + 1,
                tlwh: d.tlwh,
                score: d.score,
                confirmed: true,
                time_since_update: 0,
            })
            .collect()
    }

    fn reset(&mut self) {}

    fn track_count(&self) -> usize {
        0
    }
}

fn mixed_score_orchestrator(mode: Mode) -> Orchestrator {
    let config = RunConfig {
        preprocess: Vec::new(),
        ..RunConfig::default()
    };
    Orchestrator::new(mode, MotModel::joint(MixedScoreJoint), Box::new(EchoTracker), config).unwrap()
}

fn result_ids(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.split(',').nth(1).unwrap().to_string())
        .collect()
}

#[test]
fn test_evaluate_keeps_low_score_tracks() {
    let tmp = tempfile::tempdir().unwrap();
    let data_root = tmp.path().join("MOT16").join("train");
    let seq_dir = data_root.join("MOT16-05");
    write_images(&seq_dir.join("img1"), 1);
    fs::write(seq_dir.join("seqinfo.ini"), "[Sequence]\nframeRate=14\n").unwrap();

    let opts = TrackOptions {
        output_dir: tmp.path().join("eval"),
        draw_threshold: 0.5,
        ..TrackOptions::default()
    };
    let mut orch = mixed_score_orchestrator(Mode::Eval);
    let run = orch
        .mot_evaluate(&data_root, &["MOT16-05".to_string()], &opts)
        .unwrap();
    assert_eq!(result_ids(&run.seqs[0].result_file), ["1", "2"]);

    // 预测模式仍按 draw_threshold 过滤
    let image_dir = seq_dir.join("img1");
    let opts = TrackOptions {
        output_dir: tmp.path().join("predict"),
        draw_threshold: 0.5,
        ..TrackOptions::default()
    };
    let mut orch = mixed_score_orchestrator(Mode::Test);
    let run = orch.mot_predict(None, Some(image_dir.as_path()), -1.0, &opts).unwrap();
    assert_eq!(result_ids(&run.seqs[0].result_file), ["1"]);
}

#[test]
fn test_mux_failure_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let image_dir = tmp.path().join("MOT16-09");
    write_images(&image_dir, 2);
    let opts = TrackOptions {
        output_dir: tmp.path().join("output"),
        save_videos: true,
        ..TrackOptions::default()
    };
    let config = RunConfig {
        preprocess: Vec::new(),
        ffmpeg: tmp.path().join("missing").join("ffmpeg"),
        ..RunConfig::default()
    };
    let mut orch = Orchestrator::new(
        Mode::Test,
        MotModel::joint(StaticJoint),
        Box::new(ByteTracker::default()),
        config,
    )
    .unwrap();

    let run = orch.mot_predict(None, Some(image_dir.as_path()), -1.0, &opts).unwrap();
    let seq = &run.seqs[0];

    // 结果文件和图片序列不受影响
    assert!(seq.result_file.is_file());
    let frames_dir = opts.output_dir.join("mot_outputs").join("MOT16-09");
    assert!(frames_dir.join("00000.jpg").is_file());
    assert!(frames_dir.join("00001.jpg").is_file());
    assert!(seq.video.is_none());
    assert!(seq.mux_error.is_some());
}

#[test]
fn test_capability_mismatch_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let image_dir = tmp.path().join("seq");
    write_images(&image_dir, 1);
    let opts = TrackOptions {
        output_dir: tmp.path().join("output"),
        model_family: ModelFamily::DeepSort,
        ..TrackOptions::default()
    };

    let mut orch = orchestrator(Mode::Test);
    let err = orch.mot_predict(None, Some(image_dir.as_path()), -1.0, &opts).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MotError>(),
        Some(MotError::CapabilityMismatch(_))
    ));
    assert!(!opts.output_dir.exists());
}

#[test]
fn test_missing_input_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = TrackOptions {
        output_dir: tmp.path().join("output"),
        ..TrackOptions::default()
    };
    let mut orch = orchestrator(Mode::Test);
    let err = orch.mot_predict(None, None, -1.0, &opts).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MotError>(),
        Some(MotError::MissingInput(_))
    ));
}
