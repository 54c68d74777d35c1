/// 本地视频文件解码器
/// Local video file decoder
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};

use super::decode_filter::DecodeFilter;
use super::{estimate_frames, VideoInfo, VideoSource};
use crate::detection::Frame;
use crate::error::SourceError;

/// 读取视频流参数; 容器不可读或没有视频流都视为打开失败
pub fn probe(path: &Path) -> Result<VideoInfo, SourceError> {
    let open_err = |reason: String| SourceError::Open {
        path: path.to_path_buf(),
        reason,
    };

    if !path.is_file() {
        return Err(open_err("文件不存在".to_string()));
    }
    let url = path.to_string_lossy().to_string();

    let stream = find_video_stream_info(url.clone())
        .map_err(|e| open_err(format!("无法解析容器: {}", e)))?
        .ok_or_else(|| open_err("没有视频流".to_string()))?;

    let StreamInfo::Video {
        width,
        height,
        fps,
        nb_frames,
        ..
    } = stream
    else {
        return Err(open_err("没有视频流".to_string()));
    };

    if width <= 0 || height <= 0 {
        return Err(open_err(format!("非法分辨率 {}x{}", width, height)));
    }

    // 部分容器不写帧数, 退而用时长估算
    let frame_count = if nb_frames > 0 {
        nb_frames as u64
    } else {
        ez_ffmpeg::container_info::get_duration_us(url)
            .map(|us| estimate_frames(us, fps))
            .unwrap_or(0)
    };

    Ok(VideoInfo::new(width as u32, height as u32, fps, frame_count))
}

/// FFmpeg 视频文件源
///
/// 解码在独立线程中进行, 通过零容量通道逐帧交付, 解码不会领先消费端。
pub struct FfmpegSource {
    path: PathBuf,
    info: VideoInfo,
    rx: Option<Receiver<Frame>>,
    handle: Option<JoinHandle<Result<(), String>>>,
    frames_read: u64,
}

impl FfmpegSource {
    /// 打开视频文件并启动解码线程
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let info = probe(&path)?;
        tracing::info!(
            "🎬 打开视频: {} ({}x{} @ {}fps, 约{}帧)",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.frame_count
        );
        if info.frame_count == 0 {
            tracing::warn!("⚠️ 无法获取总帧数, 进度将在结束时更新");
        }

        let (tx, rx) = crossbeam_channel::bounded(0);
        let url = path.to_string_lossy().to_string();
        let handle = std::thread::Builder::new()
            .name("decoder".to_string())
            .spawn(move || decode_file(&url, DecodeFilter::new(tx)))
            .map_err(|e| SourceError::Open {
                path: path.clone(),
                reason: format!("无法启动解码线程: {}", e),
            })?;

        Ok(Self {
            path,
            info,
            rx: Some(rx),
            handle: Some(handle),
            frames_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn join(&mut self) -> Result<(), String> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err("解码线程异常退出".to_string())),
            None => Ok(()),
        }
    }
}

impl VideoSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(rx) = &self.rx else {
            return Ok(None);
        };

        match rx.recv() {
            Ok(mut frame) => {
                frame.index = self.frames_read;
                self.frames_read += 1;
                Ok(Some(frame))
            }
            Err(_) => {
                // 通道关闭: 解码线程已结束, 由其返回值区分正常结束与中途失败
                self.rx = None;
                self.join().map(|_| None).map_err(|reason| SourceError::Decode {
                    frame: self.frames_read,
                    reason,
                })
            }
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        // 先关闭接收端, 解码线程发送失败后退出
        self.rx.take();
        if let Err(e) = self.join() {
            tracing::debug!("解码线程结束: {}", e);
        }
    }
}

/// 解码整个文件, 每帧经 DecodeFilter 发往接收端
fn decode_file(url: &str, filter: DecodeFilter) -> Result<(), String> {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let ctx = FfmpegContext::builder()
        .input(Input::new(url))
        .filter_descs(["format=rgb24"].into())
        .output(out)
        .build()
        .map_err(|e| format!("构建失败: {}", e))?;

    let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
    sch.wait().map_err(|e| format!("解码失败: {}", e))
}
