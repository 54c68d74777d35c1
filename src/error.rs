// 错误处理模块
//
// 每个阶段(模型加载 / 视频源 / 检测 / 视频输出)都有自己的错误类型,
// 由 pipeline 统一向上传递, 不做任何重试。

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::RunSummary;

/// 配置错误 (参数非法)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} 阈值必须在 [0, 1] 范围内, 实际为 {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("目标类别名不能为空")]
    EmptyTarget,

    #[error("推理尺寸必须是 32 的正整数倍, 实际为 {0}")]
    InvalidImageSize(u32),

    #[error("字体无法加载 {}: {reason}", .path.display())]
    Font { path: PathBuf, reason: String },

    #[error("未找到可用字体, 请用 --font 指定 (已尝试: {0})")]
    NoFont(String),
}

/// 模型加载错误 (启动期致命错误)
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("模型文件不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("模型文件损坏或无法加载 {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("模型输出格式不符合 OBB 约定: {0}")]
    UnexpectedOutput(String),

    #[error("模型锁已失效 (推理线程曾经 panic)")]
    Poisoned,

    #[error("进程内已加载模型 {}, 不能换成 {}", .loaded.display(), .requested.display())]
    AlreadyLoaded { loaded: PathBuf, requested: PathBuf },
}

/// 视频源错误
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("无法打开视频 {}: {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    #[error("第 {frame} 帧解码失败: {reason}")]
    Decode { frame: u64, reason: String },
}

/// 视频输出错误
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("无法创建输出视频 {}: {reason}", .path.display())]
    Create { path: PathBuf, reason: String },

    #[error("写入第 {frame} 帧失败: {reason}")]
    Write { frame: u64, reason: String },

    #[error("输出视频收尾失败: {0}")]
    Finalize(String),

    #[error("没有写入任何帧, 不生成输出视频")]
    Empty,

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 单帧检测错误
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("帧尺寸与像素数据不匹配 ({width}x{height}, {len} 字节)")]
    BadFrame { width: u32, height: u32, len: usize },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("推理失败: {0}")]
    Inference(#[from] anyhow::Error),
}

/// 流水线错误 (一次运行的最终结果)
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("第 {frame} 帧检测失败: {source}")]
    Detect {
        frame: u64,
        #[source]
        source: DetectError,
    },

    /// 中途解码失败: 已处理的帧已写入输出文件, 但本次运行不算成功
    #[error("运行未完成 (已处理 {} 帧): {cause}", .summary.frames_processed)]
    Incomplete {
        summary: Box<RunSummary>,
        #[source]
        cause: SourceError,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
