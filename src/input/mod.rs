/// 视频输入系统 (Video Input System)
///
/// - FfmpegSource: 本地视频文件解码 (mp4/avi/mov), 独立线程解码, 逐帧交付
/// - DecodeFilter: 帧过滤, 拷贝 RGB24 数据并发往消费端
use serde::Serialize;

use crate::detection::Frame;
use crate::error::SourceError;

pub mod decode_filter;
pub mod decoder;

pub use decode_filter::DecodeFilter;
pub use decoder::{probe, FfmpegSource};

/// 视频流参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// 帧率, 四舍五入为整数, 至少为 1
    pub fps: u32,
    /// 容器声明(或由时长估算)的帧数, 0 表示未知
    pub frame_count: u64,
}

impl VideoInfo {
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        Self {
            width,
            height,
            fps: round_fps(fps),
            frame_count,
        }
    }
}

/// 帧率取整; 非法值按 1 处理
pub fn round_fps(fps: f64) -> u32 {
    if fps.is_finite() && fps >= 1.0 {
        fps.round() as u32
    } else {
        1
    }
}

/// 按时长估算帧数
pub fn estimate_frames(duration_us: i64, fps: f64) -> u64 {
    if duration_us <= 0 || !fps.is_finite() || fps <= 0.0 {
        return 0;
    }
    (duration_us as f64 / 1_000_000.0 * fps).round() as u64
}

/// 视频源: 按顺序逐帧产出, 结束后返回 `Ok(None)`
pub trait VideoSource {
    fn info(&self) -> &VideoInfo;

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}
