// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 多目标跟踪推理 (JDE / FairMOT / DeepSORT)
///
/// 主程序入口 - 直接运行: cargo run --bin mot --features onnx --release
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mot_infer_rs::config::{DataType, Mode, ModelFamily, RunConfig};
use mot_infer_rs::detection::ByteTracker;
use mot_infer_rs::models::{
    DetectorModel, MotModel, OrtConfig, OrtDetector, OrtEP, OrtEmbedder, OrtJointModel,
};
use mot_infer_rs::gen_time_string;
use mot_infer_rs::orchestrator::{Orchestrator, TrackOptions, AUTO_FRAME_RATE};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 多目标跟踪推理程序
#[derive(Parser, Debug)]
#[command(author, version, about = "MOT 跟踪推理 (JDE / FairMOT / DeepSORT)", long_about = None)]
struct Args {
    /// 运行模式: test 或 eval
    #[arg(long, default_value = "test")]
    mode: String,

    /// 模型族: JDE / DeepSORT / FairMOT
    #[arg(long, default_value = "JDE")]
    model_type: String,

    /// 联合模型 (JDE/FairMOT) 或 ReID 模型 (DeepSORT) 的 ONNX 文件
    #[arg(short, long)]
    model: PathBuf,

    /// DeepSORT 检测器 ONNX 文件 (不提供时读取检测结果文件)
    #[arg(long)]
    detector: Option<PathBuf>,

    /// 视频文件
    #[arg(long)]
    video_file: Option<PathBuf>,

    /// 图片目录
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// 评估数据根目录 (eval 模式)
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// 评估序列名, 逗号分隔 (eval 模式)
    #[arg(long, value_delimiter = ',')]
    seqs: Vec<String>,

    /// 输出目录
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// 结果格式: mot 或 kitti
    #[arg(long, default_value = "mot")]
    data_type: String,

    /// 帧率, -1 表示自动
    #[arg(long, default_value_t = AUTO_FRAME_RATE, allow_hyphen_values = true)]
    frame_rate: f64,

    /// 分数阈值 (eval 模式固定为 0)
    #[arg(long, default_value_t = 0.5)]
    draw_threshold: f32,

    /// 保存标注图片
    #[arg(long)]
    save_images: bool,

    /// 保存标注视频
    #[arg(long)]
    save_videos: bool,

    /// 显示窗口 (无窗口后端, 只会告警)
    #[arg(long)]
    show_image: bool,

    /// 检测器输出已是原图坐标
    #[arg(long)]
    scaled: bool,

    /// DeepSORT 检测结果目录 (`<dir>/<seq>.txt`)
    #[arg(long)]
    det_results_dir: Option<PathBuf>,

    /// 在输出目录下再建一层时间戳子目录
    #[arg(long)]
    timestamp_dir: bool,

    /// 运行配置文件 (不存在时写入默认配置)
    #[arg(long, default_value = "mot_config.json")]
    config: PathBuf,

    /// 标注字体 (ttf/otf)
    #[arg(long)]
    font: Option<PathBuf>,

    /// 使用 CUDA 设备
    #[arg(long)]
    cuda: bool,

    /// 使用 TensorRT 设备
    #[arg(long)]
    trt: bool,

    /// 设备 ID
    #[arg(long, default_value_t = 0)]
    device_id: i32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // 配置错误在处理开始前立即返回
    let mode: Mode = args.mode.parse()?;
    let model_family: ModelFamily = args.model_type.parse()?;
    let data_type: DataType = args.data_type.parse()?;

    let config = RunConfig::load(&args.config);
    config.log_summary();

    let ep = if args.trt {
        OrtEP::Trt(args.device_id)
    } else if args.cuda {
        OrtEP::CUDA(args.device_id)
    } else {
        OrtEP::CPU
    };

    let model = if model_family.is_joint() {
        let joint = OrtJointModel::new(OrtConfig::new(&args.model, ep))
            .with_context(|| format!("failed to load {}", args.model.display()))?;
        MotModel::joint(joint)
    } else {
        let detector = match &args.detector {
            Some(path) => {
                let detector = OrtDetector::new(OrtConfig::new(path, ep))
                    .with_context(|| format!("failed to load {}", path.display()))?;
                Some(Box::new(detector) as Box<dyn DetectorModel>)
            }
            None => None,
        };
        let embedder = OrtEmbedder::new(OrtConfig::new(&args.model, ep))
            .with_context(|| format!("failed to load {}", args.model.display()))?;
        MotModel::separate(detector, embedder)
    };

    let tracker = ByteTracker::new(config.tracker.clone());
    info!("🎯 {} | {:?} | 跟踪器: ByteTrack", model_family, ep);

    let mut orchestrator = Orchestrator::new(mode, model, Box::new(tracker), config)?;
    if let Some(font) = &args.font {
        orchestrator = orchestrator.with_font(font);
    }

    let output_dir = if args.timestamp_dir {
        args.output_dir.join(gen_time_string("-"))
    } else {
        args.output_dir.clone()
    };

    let opts = TrackOptions {
        output_dir: output_dir.clone(),
        data_type,
        model_family,
        save_images: args.save_images,
        save_videos: args.save_videos,
        show_image: args.show_image,
        scaled: args.scaled,
        det_results_dir: args.det_results_dir.clone(),
        draw_threshold: args.draw_threshold,
    };

    let summary = match (&args.data_root, mode) {
        (Some(data_root), _) => orchestrator.mot_evaluate(data_root, &args.seqs, &opts)?,
        (None, Mode::Eval) => {
            anyhow::bail!("eval mode needs --data-root and --seqs");
        }
        (None, Mode::Test) => orchestrator.mot_predict(
            args.video_file.as_deref(),
            args.image_dir.as_deref(),
            args.frame_rate,
            &opts,
        )?,
    };

    for seq in &summary.seqs {
        if let Some(e) = &seq.mux_error {
            warn!(seq = %seq.seq, "⚠️  视频未生成: {}", e);
        }
    }
    info!(
        seqs = summary.seqs.len(),
        frames = summary.frames(),
        "✅ 完成, 结果保存在 {}",
        output_dir.join("mot_results").display()
    );
    Ok(())
}
