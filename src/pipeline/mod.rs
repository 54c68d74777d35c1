/// 视频处理流水线 (Video Processing Pipeline)
///
/// 单次运行按帧顺序串行处理:
/// - Source:   视频解码 (独立解码线程, 零容量通道交付)
/// - Detector: 旋转框检测 + 绘制
/// - Tally:    目标计数
/// - Sink:     视频编码 (独立编码线程)
pub mod progress;
pub mod runner;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

pub use progress::{BarProgress, NoProgress, Progress, ProgressObserver};
pub use runner::{process, SparkPipeline};

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// 从视频源读出并完成检测的帧数
    pub frames_processed: u64,
    /// 写入输出视频的帧数, 与 frames_processed 相同
    pub frames_written: u64,
    /// 目标类别检测总数 (逐帧累加, 不做跨帧去重)
    pub spark_count: u64,
    pub target: String,
    /// 各类别检测总数
    pub class_totals: BTreeMap<String, u64>,
    /// 容器声明的帧数, 0 表示未知
    pub frame_count_estimate: u64,
    pub output_path: PathBuf,
    /// 是否读到了视频末尾
    pub completed: bool,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Local>,
}

impl RunSummary {
    /// 平均处理帧率
    pub fn fps(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.frames_processed as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}
