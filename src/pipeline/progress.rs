use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use super::RunSummary;

/// 进度计算: 第 k 帧完成后进度为 min(k / N, 1.0)
///
/// N 为容器声明的帧数; 帧数未知 (N = 0) 时运行中保持 0, 结束时由调用方报告 1.0。
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    total: u64,
    done: u64,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self { total, done: 0 }
    }

    /// 完成一帧, 返回新进度
    pub fn advance(&mut self) -> f32 {
        self.done += 1;
        self.fraction()
    }

    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.done as f64 / self.total as f64).min(1.0) as f32
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// 进度观察者; 收到的进度值单调不减, 成功结束时最后一次为 1.0
pub trait ProgressObserver {
    fn on_progress(&mut self, fraction: f32, frames_done: u64);

    fn on_finish(&mut self, _summary: &RunSummary) {}
}

/// 不关心进度
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _fraction: f32, _frames_done: u64) {}
}

/// 终端进度条
pub struct BarProgress {
    pb: ProgressBar,
}

/// 进度条刻度
const BAR_TICKS: u64 = 1000;

impl BarProgress {
    pub fn new() -> Self {
        let pb = ProgressBar::new(BAR_TICKS);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(200));
        Self { pb }
    }

    /// 不可见的进度条 (--json 模式)
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for BarProgress {
    fn on_progress(&mut self, fraction: f32, frames_done: u64) {
        self.pb
            .set_position((fraction as f64 * BAR_TICKS as f64).round() as u64);
        self.pb.set_message(format!("{} 帧", frames_done));
    }

    fn on_finish(&mut self, summary: &RunSummary) {
        self.pb.finish_with_message(format!(
            "{} 帧, {:.1} fps",
            summary.frames_processed,
            summary.fps()
        ));
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        if !self.pb.is_finished() {
            self.pb.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let mut p = Progress::new(4);
        assert_eq!(p.fraction(), 0.0);
        assert_eq!(p.advance(), 0.25);
        assert_eq!(p.advance(), 0.5);
        p.advance();
        assert_eq!(p.advance(), 1.0);
        // 实际帧数超过声明帧数时封顶
        assert_eq!(p.advance(), 1.0);
        assert_eq!(p.done(), 5);
    }

    #[test]
    fn test_unknown_total_stays_zero() {
        let mut p = Progress::new(0);
        assert_eq!(p.advance(), 0.0);
        assert_eq!(p.advance(), 0.0);
    }
}
