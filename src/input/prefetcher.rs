// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧预取器 (Frame Prefetcher)
//!
//! 单个后台线程: 读帧 → 预处理 → 有界队列; 主线程按采集顺序取样本。
//! 队列满时生产者每 10ms 重试一次, 不会阻塞在发送上, 也不会因此退出。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use super::source::FrameSource;
use crate::detection::Frame;
use crate::preprocess::{PreprocessedSample, Preprocessor};

/// 队列满时的重试间隔
const FULL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 取消令牌 (可跨线程克隆)
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 帧预取器
pub struct FramePrefetcher {
    rx: Receiver<PreprocessedSample>,
    ended: Arc<AtomicBool>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
    capacity: usize,
    frame_rate: Option<f64>,
    frame_count: Option<u64>,
}

impl FramePrefetcher {
    /// 启动预取线程, `buffer_size` 为0时按1处理
    pub fn spawn<S>(source: S, preprocessor: Preprocessor, buffer_size: usize) -> anyhow::Result<Self>
    where
        S: FrameSource + 'static,
    {
        let capacity = buffer_size.max(1);
        let (tx, rx) = bounded(capacity);
        let ended = Arc::new(AtomicBool::new(false));
        let cancel = CancelToken::new();
        let frame_rate = source.frame_rate();
        let frame_count = source.frame_count();

        let worker = {
            let ended = ended.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("frame-prefetch".to_string())
                .spawn(move || prefetch_loop(source, preprocessor, tx, ended, cancel))?
        };

        info!(capacity, "🚀 预取线程启动");
        Ok(Self {
            rx,
            ended,
            cancel,
            worker: Some(worker),
            capacity,
            frame_rate,
            frame_count,
        })
    }

    /// 取出最早的样本
    ///
    /// 队列为空且来源已结束时返回 None; 否则阻塞等待
    pub fn get_frame(&self) -> Option<PreprocessedSample> {
        self.rx.recv().ok()
    }

    /// 来源是否已结束 (队列里可能还有样本)
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// 当前已缓冲的样本数
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    pub fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

impl Drop for FramePrefetcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("❌ 预取线程异常退出");
            }
        }
    }
}

fn prefetch_loop<S: FrameSource>(
    mut source: S,
    preprocessor: Preprocessor,
    tx: Sender<PreprocessedSample>,
    ended: Arc<AtomicBool>,
    cancel: CancelToken,
) {
    let mut index: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!(frames = index, "🛑 预取已取消");
            return;
        }
        if !source.is_opened() {
            break;
        }
        if tx.is_full() {
            thread::sleep(FULL_POLL_INTERVAL);
            continue;
        }

        let Some(image) = source.read() else {
            break;
        };
        let frame = Frame::new(index, image);
        index += 1;

        let sample = match preprocessor.process_frame(&frame) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(frame = frame.index, error = %e, "⚠️  预处理失败, 停止预取");
                break;
            }
        };

        if !push(&tx, sample, &cancel) {
            return;
        }
    }

    ended.store(true, Ordering::SeqCst);
    info!(frames = index, "✅ 视频流结束");
}

/// 推入队列, 满时轮询; 取消或消费者断开时返回 false
fn push(tx: &Sender<PreprocessedSample>, mut sample: PreprocessedSample, cancel: &CancelToken) -> bool {
    loop {
        match tx.try_send(sample) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => {
                if cancel.is_cancelled() {
                    return false;
                }
                sample = back;
                thread::sleep(FULL_POLL_INTERVAL);
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::AtomicUsize;

    use crate::preprocess::PreprocessOp;

    /// 测试来源: 第 `fail_at` 次读取 (从1开始) 失败
    struct TestSource {
        total: u8,
        next: u8,
        fail_at: Option<u8>,
        reads: Arc<AtomicUsize>,
    }

    impl FrameSource for TestSource {
        fn is_opened(&self) -> bool {
            true
        }

        fn read(&mut self) -> Option<RgbImage> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.next += 1;
            if self.next > self.total || Some(self.next) == self.fail_at {
                return None;
            }
            Some(RgbImage::from_pixel(2, 2, Rgb([self.next, 0, 0])))
        }
    }

    fn raw_preprocessor() -> Preprocessor {
        Preprocessor::new(vec![PreprocessOp::Permute]).unwrap()
    }

    fn source(total: u8, fail_at: Option<u8>) -> (TestSource, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        (
            TestSource {
                total,
                next: 0,
                fail_at,
                reads: reads.clone(),
            },
            reads,
        )
    }

    #[test]
    fn test_order_and_single_sentinel() {
        let (src, _) = source(5, None);
        let prefetcher = FramePrefetcher::spawn(src, raw_preprocessor(), 2).unwrap();

        let mut seen = Vec::new();
        while let Some(sample) = prefetcher.get_frame() {
            seen.push((sample.frame.index, sample.frame.image.get_pixel(0, 0)[0]));
        }
        assert_eq!(seen, vec![(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]);
        assert!(prefetcher.is_ended());
        assert!(prefetcher.get_frame().is_none());
    }

    #[test]
    fn test_read_failure_stops_worker() {
        let (src, reads) = source(5, Some(3));
        let prefetcher = FramePrefetcher::spawn(src, raw_preprocessor(), 2).unwrap();

        let mut seen = Vec::new();
        while let Some(sample) = prefetcher.get_frame() {
            seen.push(sample.frame.image.get_pixel(0, 0)[0]);
        }
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_bounded_buffer_backpressure() {
        let (src, reads) = source(20, None);
        let prefetcher = FramePrefetcher::spawn(src, raw_preprocessor(), 3).unwrap();

        // 消费者不取数据时, 生产者最多读 capacity 帧
        thread::sleep(Duration::from_millis(100));
        assert_eq!(prefetcher.buffered(), 3);
        assert_eq!(reads.load(Ordering::SeqCst), 3);
        assert!(!prefetcher.is_ended());

        let mut count = 0;
        while let Some(_sample) = prefetcher.get_frame() {
            assert!(prefetcher.buffered() <= prefetcher.capacity());
            count += 1;
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_drop_cancels_worker() {
        let (src, reads) = source(u8::MAX, None);
        let prefetcher = FramePrefetcher::spawn(src, raw_preprocessor(), 2).unwrap();
        assert!(prefetcher.get_frame().is_some());
        drop(prefetcher);

        let after_drop = reads.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(reads.load(Ordering::SeqCst), after_drop);
    }

    #[test]
    fn test_zero_buffer_clamped() {
        let (src, _) = source(3, None);
        let prefetcher = FramePrefetcher::spawn(src, raw_preprocessor(), 0).unwrap();
        assert_eq!(prefetcher.capacity(), 1);
        let mut count = 0;
        while prefetcher.get_frame().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
