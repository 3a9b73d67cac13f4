// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 视频输出 (外部 ffmpeg 进程)
//!
//! - VideoWriter:        原始 RGB 帧通过 stdin 送给 ffmpeg 编码
//! - mux_image_sequence: 把 `%05d.jpg` 序列合成为 mp4

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::error::MotError;

/// 通过 ffmpeg 子进程写视频
///
/// 第一次写入时按帧尺寸启动编码进程
pub struct VideoWriter {
    program: PathBuf,
    path: PathBuf,
    frame_rate: f64,
    size: Option<(u32, u32)>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frames: u64,
}

impl VideoWriter {
    pub fn new(path: impl Into<PathBuf>, frame_rate: f64) -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            path: path.into(),
            frame_rate,
            size: None,
            child: None,
            stdin: None,
            frames: 0,
        }
    }

    /// 指定 ffmpeg 可执行文件
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn start(&mut self, width: u32, height: u32) -> Result<(), MotError> {
        let mut child = Command::new(&self.program)
            .args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(format!("{}", self.frame_rate))
            .args(["-i", "-", "-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| MotError::Mux(format!("failed to start ffmpeg: {e}")))?;

        self.stdin = child.stdin.take();
        self.child = Some(child);
        self.size = Some((width, height));
        info!(
            "🎬 视频写入: {} ({}x{} @ {:.2} fps)",
            self.path.display(),
            width,
            height,
            self.frame_rate
        );
        Ok(())
    }

    /// 写入一帧 (尺寸必须与第一帧一致)
    pub fn write(&mut self, frame: &RgbImage) -> Result<(), MotError> {
        let (w, h) = frame.dimensions();
        match self.size {
            None => self.start(w, h)?,
            Some(size) if size != (w, h) => {
                return Err(MotError::Mux(format!(
                    "frame size {}x{} differs from video size {}x{}",
                    w, h, size.0, size.1
                )));
            }
            Some(_) => {}
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MotError::Mux("video writer already finished".to_string()))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| MotError::Mux(format!("ffmpeg pipe closed: {e}")))?;
        self.frames += 1;
        Ok(())
    }

    /// 关闭管道并等待编码结束
    pub fn finish(&mut self) -> Result<(), MotError> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| MotError::Mux(format!("failed to wait for ffmpeg: {e}")))?;
        if !status.success() {
            return Err(MotError::Mux(format!("ffmpeg exited with {status}")));
        }
        info!(frames = self.frames, "💾 Save video in {}", self.path.display());
        Ok(())
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.finish() {
                warn!("⚠️  视频写入结束失败: {}", e);
            }
        }
    }
}

/// 构造合成命令的参数: `ffmpeg -f image2 -framerate {fps} -i {dir}/%05d.jpg {out}`
pub fn mux_args(image_dir: &Path, output: &Path, frame_rate: f64) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "image2".to_string(),
        "-framerate".to_string(),
        format!("{}", frame_rate),
        "-i".to_string(),
        image_dir.join("%05d.jpg").to_string_lossy().into_owned(),
        output.to_string_lossy().into_owned(),
    ]
}

/// 用 `program` (ffmpeg) 把 `image_dir/%05d.jpg` 合成为视频
pub fn mux_image_sequence(
    program: &Path,
    image_dir: &Path,
    output: &Path,
    frame_rate: f64,
) -> Result<(), MotError> {
    let args = mux_args(image_dir, output, frame_rate);
    debug!(program = %program.display(), ?args, "ffmpeg");
    let status = Command::new(program)
        .args(&args)
        .stdout(Stdio::null())
        .status()
        .map_err(|e| MotError::Mux(format!("failed to run ffmpeg: {e}")))?;
    if !status.success() {
        return Err(MotError::Mux(format!(
            "ffmpeg exited with {status} while muxing {}",
            image_dir.display()
        )));
    }
    info!("💾 Save video in {}", output.display());
    Ok(())
}
