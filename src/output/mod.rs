/// 视频输出系统 (Video Output System)
///
/// - FfmpegSink: 原始 RGB24 帧 → mp4 (mpeg4), 编码在独立线程进行
/// - RawFrameReader: 把逐帧数据切成 FFmpeg 读回调需要的字节块
use std::path::{Path, PathBuf};

use crate::detection::Frame;
use crate::error::SinkError;

pub mod encoder;
pub mod raw_reader;

pub use encoder::FfmpegSink;
pub use raw_reader::RawFrameReader;

/// 视频输出
///
/// 帧按写入顺序编码; `finish` 之后输出文件才对外可见。
/// 未调用 `finish` 就被丢弃时不会留下不完整的文件。
pub trait VideoSink {
    fn write(&mut self, frame: Frame) -> Result<(), SinkError>;

    fn frames_written(&self) -> u64;

    /// 完成编码并发布输出文件, 返回最终路径
    ///
    /// 一帧都没有写入时返回 [`SinkError::Empty`], 不发布任何文件。
    fn finish(self) -> Result<PathBuf, SinkError>
    where
        Self: Sized;
}

/// 编码中的临时文件: `out.mp4` → `out.partial.mp4`
pub fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp4".to_string());
    output.with_file_name(format!("{}.partial.{}", stem, ext))
}
