// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 运行配置 - 通过JSON文件调整参数
//!
//! - `Mode` / `ModelFamily` / `DataType`: 命令行可选值,非法值为致命错误
//! - `RunConfig`: 预处理流水线、缓冲区大小、过滤阈值等

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::ByteTrackConfig;
use crate::error::MotError;
use crate::preprocess::PreprocessOp;

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 推理 (不计算指标)
    Test,
    /// 评估 (注册的指标会在每个序列后更新)
    Eval,
}

impl FromStr for Mode {
    type Err = MotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Mode::Test),
            "eval" => Ok(Mode::Eval),
            _ => Err(MotError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Test => write!(f, "test"),
            Mode::Eval => write!(f, "eval"),
        }
    }
}

/// 模型族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Jde,
    DeepSort,
    FairMot,
}

impl ModelFamily {
    /// 单阶段 (联合检测+嵌入) 还是两阶段 (检测器+ReID)
    pub fn is_joint(&self) -> bool {
        matches!(self, ModelFamily::Jde | ModelFamily::FairMot)
    }
}

impl FromStr for ModelFamily {
    type Err = MotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jde" => Ok(ModelFamily::Jde),
            "deepsort" => Ok(ModelFamily::DeepSort),
            "fairmot" => Ok(ModelFamily::FairMot),
            _ => Err(MotError::UnsupportedModelFamily(s.to_string())),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Jde => write!(f, "JDE"),
            ModelFamily::DeepSort => write!(f, "DeepSORT"),
            ModelFamily::FairMot => write!(f, "FairMOT"),
        }
    }
}

/// 结果文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// `frame,id,x1,y1,w,h,score,-1,-1,-1`
    Mot,
    /// KITTI 跟踪格式, 帧号减1, 只有角点坐标
    Kitti,
}

impl FromStr for DataType {
    type Err = MotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mot" => Ok(DataType::Mot),
            "kitti" => Ok(DataType::Kitti),
            _ => Err(MotError::UnsupportedDataType(s.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Mot => write!(f, "mot"),
            DataType::Kitti => write!(f, "kitti"),
        }
    }
}

/// 运行参数配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    // === 预处理 ===
    pub preprocess: Vec<PreprocessOp>, // 预处理算子 (按顺序执行)
    pub buffer_size: usize,            // 预取队列容量

    // === 过滤参数 ===
    pub min_box_area: f32,      // 最小框面积 (JDE/FairMOT)
    pub vertical_ratio: f32,    // 宽高比上限, 超过视为噪声

    // === ReID裁剪 ===
    pub crop_width: u32,
    pub crop_height: u32,

    // === 日志 ===
    pub jde_log_interval: u64, // JDE每隔多少帧打印一次FPS
    pub sde_log_interval: u64, // DeepSORT每隔多少帧打印一次FPS

    // === 帧率 ===
    pub fallback_frame_rate: f64,  // 视频帧率探测失败时使用
    pub image_dir_frame_rate: f64, // 图片目录默认帧率

    // === 视频输出 ===
    pub ffmpeg: PathBuf, // ffmpeg 可执行文件

    // === 默认跟踪器 ===
    pub tracker: ByteTrackConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessOp::default_pipeline(),
            buffer_size: 50,

            min_box_area: 200.0,
            vertical_ratio: 1.6,

            crop_width: 64,
            crop_height: 192,

            jde_log_interval: 2000,
            sde_log_interval: 40,

            fallback_frame_rate: 25.01,
            image_dir_frame_rate: 30.0,

            ffmpeg: PathBuf::from("ffmpeg"),

            tracker: ByteTrackConfig::default(),
        }
    }
}

impl RunConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写入默认配置; 解析失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!(path = %path.display(), "✅ 配置已加载");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "⚠️  配置文件解析失败, 使用默认值");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "📝 配置文件不存在, 创建默认配置");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!(error = %e, "❌ 保存默认配置失败");
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!(path = %path.as_ref().display(), "💾 配置已保存");
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!(
            ops = self.preprocess.len(),
            buffer_size = self.buffer_size,
            min_box_area = self.min_box_area,
            crop = %format!("{}x{}", self.crop_width, self.crop_height),
            "🎛️  当前运行配置"
        );
    }
}
