// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测结果文件
//!
//! 每行一个检测框: `frame_id,x0,y0,w,h,score,class_id`, frame_id 从1开始。
//! 逗号或空白分隔, 空行忽略。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::detection::Tlwh;
use crate::error::MotError;

/// 检测结果文件中的一个框
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetRecord {
    pub tlwh: Tlwh,
    pub score: f32,
    pub cls_id: f32,
}

/// 按帧索引 (从0开始) 的检测结果, 只保存有检测框的帧
#[derive(Clone, Debug, Default)]
pub struct DetResults {
    frames: BTreeMap<u64, Vec<DetRecord>>,
    num_frames: u64,
}

impl DetResults {
    /// 第 `frame_index` 帧 (从0开始) 的检测框, 越界时为空
    pub fn frame(&self, frame_index: u64) -> &[DetRecord] {
        self.frames
            .get(&frame_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn num_frames(&self) -> u64 {
        self.num_frames
    }
}

/// 读取检测结果文件
///
/// `num_frames` 为 None 时按文件中最大帧号确定帧数
pub fn load_det_results(
    path: impl AsRef<Path>,
    num_frames: Option<usize>,
) -> Result<DetResults, MotError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MotError::NotAFile(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|e| MotError::InvalidDetFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let limit = num_frames.map(|n| n as u64);
    let mut frames: BTreeMap<u64, Vec<DetRecord>> = BTreeMap::new();
    for (line_no, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() != 7 {
            return Err(MotError::InvalidDetFile {
                path: path.to_path_buf(),
                reason: format!("line {}: expected 7 fields, got {}", line_no + 1, fields.len()),
            });
        }

        let mut values = [0f32; 7];
        for (value, field) in values.iter_mut().zip(&fields) {
            *value = field.parse().map_err(|_| MotError::InvalidDetFile {
                path: path.to_path_buf(),
                reason: format!("line {}: `{}` is not a number", line_no + 1, field),
            })?;
        }

        let frame_id = values[0] as i64;
        if frame_id < 1 {
            debug!(line = line_no + 1, frame_id, "skip record with invalid frame id");
            continue;
        }
        let index = frame_id as u64 - 1;
        if limit.is_some_and(|n| index >= n) {
            continue;
        }
        frames.entry(index).or_default().push(DetRecord {
            tlwh: Tlwh::new(values[1], values[2], values[3], values[4]),
            score: values[5],
            cls_id: values[6],
        });
    }

    let total = limit.unwrap_or_else(|| frames.keys().next_back().map_or(0, |&i| i + 1));
    info!(path = %path.display(), frames = total, "✅ 检测结果文件已加载");
    Ok(DetResults {
        frames,
        num_frames: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_grouped_by_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MOT16-02.txt");
        fs::write(
            &path,
            "1,10,20,30,40,0.9,0\n\
             1,50,60,70,80,0.4,0\n\
             \n\
             3 5 5 10 10 0.8 1\n\
             9,1,1,1,1,0.5,0\n",
        )
        .unwrap();

        let dets = load_det_results(&path, Some(4)).unwrap();
        assert_eq!(dets.num_frames(), 4);
        assert_eq!(dets.frame(0).len(), 2);
        assert_eq!(dets.frame(0)[0].tlwh, Tlwh::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(dets.frame(0)[1].score, 0.4);
        assert!(dets.frame(1).is_empty());
        assert_eq!(dets.frame(2)[0].cls_id, 1.0);
        // 超出帧数的记录被忽略
        assert!(dets.frame(8).is_empty());

        let dets = load_det_results(&path, None).unwrap();
        assert_eq!(dets.num_frames(), 9);
        assert_eq!(dets.frame(8).len(), 1);
    }

    #[test]
    fn test_sparse_frame_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.txt");
        fs::write(&path, "2,10,20,30,40,0.9,0\n1e9,1,1,1,1,0.5,0\n").unwrap();

        let dets = load_det_results(&path, None).unwrap();
        assert_eq!(dets.num_frames(), 1_000_000_000);
        assert_eq!(dets.frame(1).len(), 1);
        assert_eq!(dets.frame(999_999_999).len(), 1);
        assert!(dets.frame(500).is_empty());

        let dets = load_det_results(&path, Some(10)).unwrap();
        assert_eq!(dets.num_frames(), 10);
        assert!(dets.frame(999_999_999).is_empty());
    }

    #[test]
    fn test_invalid_field_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "1,10,20,30,40,0.9\n").unwrap();
        assert!(matches!(
            load_det_results(&path, None),
            Err(MotError::InvalidDetFile { .. })
        ));
        assert!(matches!(
            load_det_results(dir.path().join("missing.txt"), None),
            Err(MotError::NotAFile(_))
        ));
    }
}
