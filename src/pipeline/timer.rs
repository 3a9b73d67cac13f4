// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::time::Instant;

/// 简单计时器: 累计总耗时与调用次数
#[derive(Debug, Clone, Default)]
pub struct Timer {
    start: Option<Instant>,
    pub total_time: f64,
    pub calls: u64,
    pub average_time: f64,
    pub diff: f64,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tic(&mut self) {
        self.start = Some(Instant::now());
    }

    /// 结束一次计时, 返回平均耗时 (秒)
    pub fn toc(&mut self) -> f64 {
        let Some(start) = self.start.take() else {
            return self.average_time;
        };
        self.diff = start.elapsed().as_secs_f64();
        self.total_time += self.diff;
        self.calls += 1;
        self.average_time = self.total_time / self.calls as f64;
        self.average_time
    }

    /// 按平均耗时计算的帧率
    pub fn fps(&self) -> f64 {
        1.0 / self.average_time.max(1e-5)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_timer_average() {
        let mut timer = Timer::new();
        assert!(timer.fps() > 9.9e4);

        for _ in 0..3 {
            timer.tic();
            thread::sleep(Duration::from_millis(5));
            timer.toc();
        }
        assert_eq!(timer.calls, 3);
        assert!(timer.total_time >= 0.015);
        assert!((timer.average_time - timer.total_time / 3.0).abs() < 1e-12);
        assert!(timer.diff >= 0.005);

        // 未 tic 的 toc 不计数
        timer.toc();
        assert_eq!(timer.calls, 3);

        timer.clear();
        assert_eq!(timer.calls, 0);
    }
}
