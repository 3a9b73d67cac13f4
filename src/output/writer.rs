// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪结果文本格式 (MOT / KITTI)

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::DataType;
use crate::detection::FrameResult;

/// 按 Python `str(float)` 的规则格式化浮点数
///
/// 最短往返表示, 整数值带 `.0`, 指数 < -4 或 >= 16 时用 `1e-05` 形式
pub fn format_float(v: f32) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let sci = format!("{:e}", v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if (-4..16).contains(&exp) {
        let s = format!("{}", v);
        if s.contains('.') {
            s
        } else {
            format!("{s}.0")
        }
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    }
}

/// 格式化一帧结果, 负ID的目标跳过
pub fn format_frame(result: &FrameResult, data_type: DataType) -> Vec<String> {
    let mut lines = Vec::with_capacity(result.len());
    for ((tlwh, score), &id) in result
        .tlwhs
        .iter()
        .zip(&result.scores)
        .zip(&result.ids)
    {
        if id < 0 {
            continue;
        }
        let (x1, y1, w, h) = (tlwh.x, tlwh.y, tlwh.w, tlwh.h);
        let line = match data_type {
            DataType::Mot => format!(
                "{},{},{},{},{},{},{},-1,-1,-1",
                result.frame_id,
                id,
                format_float(x1),
                format_float(y1),
                format_float(w),
                format_float(h),
                format_float(*score),
            ),
            DataType::Kitti => format!(
                "{} {} car 0 0 -10 {} {} {} {} -10 -10 -10 -1000 -1000 -1000 -10",
                result.frame_id as i64 - 1,
                id,
                format_float(x1),
                format_float(y1),
                format_float(x1 + w),
                format_float(y1 + h),
            ),
        };
        lines.push(line);
    }
    lines
}

/// 写出一个序列的全部结果, 父目录不存在时自动创建
pub fn write_mot_results(
    path: impl AsRef<Path>,
    results: &[FrameResult],
    data_type: DataType,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for result in results {
        for line in format_frame(result, data_type) {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;

    info!("💾 MOT results save in {}", path.display());
    Ok(())
}
