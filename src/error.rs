// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 错误类型 (Error types)
//!
//! 配置错误和缺失输入都是致命错误,在处理开始前立即返回。
//! 视频流结束不是错误。

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MotError {
    #[error("mode should be 'test' or 'eval', got '{0}'")]
    InvalidMode(String),

    #[error("model_type should be 'JDE', 'DeepSORT' or 'FairMOT', got '{0}'")]
    UnsupportedModelFamily(String),

    #[error("data_type should be 'mot' or 'kitti', got '{0}'")]
    UnsupportedDataType(String),

    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("{} is not a file", .0.display())]
    NotAFile(PathBuf),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("no image found in {}", .0.display())]
    NoImages(PathBuf),

    #[error("invalid detection results file {}: {reason}", .path.display())]
    InvalidDetFile { path: PathBuf, reason: String },

    #[error("preprocess failed: {0}")]
    Preprocess(String),

    /// 模型族与提供的模型能力不匹配 (例如 DeepSORT 却只给了联合模型)
    #[error("model capability mismatch: {0}")]
    CapabilityMismatch(String),

    #[error("failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("video muxing failed: {0}")]
    Mux(String),

    #[error("video input {} requires the `ffmpeg` feature", .0.display())]
    VideoUnsupported(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_thread_spawn_keeps_source() {
        let err = MotError::ThreadSpawn {
            name: "video-decode",
            source: io::Error::new(io::ErrorKind::WouldBlock, "no threads left"),
        };
        assert_eq!(
            err.to_string(),
            "failed to spawn video-decode thread: no threads left"
        );
        assert!(err.source().is_some());
    }
}
