/// 视频编码输出
/// Raw RGB24 frames → mp4 via a custom-read FFmpeg input
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use ez_ffmpeg::{FfmpegContext, Input, Output};

use super::raw_reader::RawFrameReader;
use super::{partial_path, VideoSink};
use crate::detection::Frame;
use crate::error::SinkError;
use crate::input::VideoInfo;

/// 编码线程的失败阶段
#[derive(Debug)]
enum EncodeFailure {
    /// 构建或启动 FFmpeg 上下文失败, 输出从未建立
    Build(String),
    /// 编码过程中失败
    Encode(String),
}

/// FFmpeg 视频输出
///
/// 编码先写到同目录下的 `*.partial.mp4`, `finish` 成功后再重命名为最终路径,
/// 中途放弃时删除临时文件。
/// FFmpeg 上下文在编码线程里构建, 构建失败会在下一次 `write` 或 `finish`
/// 时以 [`SinkError::Create`] 返回。
pub struct FfmpegSink {
    output: PathBuf,
    partial: PathBuf,
    info: VideoInfo,
    tx: Option<Sender<Vec<u8>>>,
    handle: Option<JoinHandle<Result<(), EncodeFailure>>>,
    frames_written: u64,
    published: bool,
}

impl FfmpegSink {
    /// 创建输出, 尺寸和帧率与输入视频一致
    pub fn create(output: impl AsRef<Path>, info: &VideoInfo) -> Result<Self, SinkError> {
        let output = output.as_ref().to_path_buf();
        let create_err = |reason: String| SinkError::Create {
            path: output.clone(),
            reason,
        };

        if info.width == 0 || info.height == 0 {
            return Err(create_err(format!("非法分辨率 {}x{}", info.width, info.height)));
        }
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(create_err(format!("目录不存在: {}", dir.display())));
            }
        }

        // 先建空的临时文件, 目标不可写时在这里就失败
        let partial = partial_path(&output);
        std::fs::File::create(&partial).map_err(|e| {
            create_err(format!("无法写入 {}: {}", partial.display(), e))
        })?;

        // 零容量通道: 编码器收走上一帧之前, 检测端不会多攒帧
        let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(0);
        let target = partial.to_string_lossy().to_string();
        let size = format!("{}x{}", info.width, info.height);
        let fps = info.fps.to_string();

        let handle = std::thread::Builder::new()
            .name("encoder".to_string())
            .spawn(move || {
                let mut reader = RawFrameReader::new(rx);
                let input = Input::new_by_read_callback(move |buf: &mut [u8]| reader.read(buf))
                    .set_format("rawvideo")
                    .set_input_opts(
                        [
                            ("video_size", size.as_str()),
                            ("pixel_format", "rgb24"),
                            ("framerate", fps.as_str()),
                        ]
                        .into(),
                    );
                let out = Output::from(target.as_str()).set_video_codec("mpeg4");

                let ctx = FfmpegContext::builder()
                    .input(input)
                    .output(out)
                    .build()
                    .map_err(|e| EncodeFailure::Build(format!("构建失败: {}", e)))?;
                let sch = ctx
                    .start()
                    .map_err(|e| EncodeFailure::Build(format!("启动失败: {}", e)))?;
                sch.wait()
                    .map_err(|e| EncodeFailure::Encode(format!("编码失败: {}", e)))
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(create_err(format!("无法启动编码线程: {}", e)));
            }
        };

        tracing::info!(
            "💾 输出视频: {} ({}x{} @ {}fps, mpeg4)",
            output.display(),
            info.width,
            info.height,
            info.fps
        );

        Ok(Self {
            output,
            partial,
            info: *info,
            tx: Some(tx),
            handle: Some(handle),
            frames_written: 0,
            published: false,
        })
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn join(&mut self) -> Result<(), EncodeFailure> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(EncodeFailure::Encode("编码线程异常退出".to_string()))),
            None => Ok(()),
        }
    }

    /// 编码线程的失败原因转成对外的错误; 上下文没建起来算创建失败
    fn failure(
        &self,
        failure: EncodeFailure,
        otherwise: impl FnOnce(String) -> SinkError,
    ) -> SinkError {
        match failure {
            EncodeFailure::Build(reason) => SinkError::Create {
                path: self.output.clone(),
                reason,
            },
            EncodeFailure::Encode(reason) => otherwise(reason),
        }
    }

    fn discard_partial(&self) {
        if self.partial.exists() {
            if let Err(e) = std::fs::remove_file(&self.partial) {
                tracing::warn!("⚠️ 无法删除临时文件 {}: {}", self.partial.display(), e);
            }
        }
    }
}

impl VideoSink for FfmpegSink {
    fn write(&mut self, frame: Frame) -> Result<(), SinkError> {
        let index = frame.index;
        if frame.width != self.info.width || frame.height != self.info.height {
            return Err(SinkError::Write {
                frame: index,
                reason: format!(
                    "帧尺寸 {}x{} 与输出 {}x{} 不一致",
                    frame.width, frame.height, self.info.width, self.info.height
                ),
            });
        }
        if frame.data.len() != frame.expected_len() {
            return Err(SinkError::Write {
                frame: index,
                reason: format!("帧数据长度 {} 不是 RGB24", frame.data.len()),
            });
        }

        let Some(tx) = &self.tx else {
            return Err(SinkError::Write {
                frame: index,
                reason: "输出已关闭".to_string(),
            });
        };

        if tx.send(frame.data).is_err() {
            // 编码线程已退出, 取回其错误原因
            self.tx = None;
            let failure = self
                .join()
                .err()
                .unwrap_or_else(|| EncodeFailure::Encode("编码线程提前结束".to_string()));
            return Err(self.failure(failure, |reason| SinkError::Write {
                frame: index,
                reason,
            }));
        }

        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(mut self) -> Result<PathBuf, SinkError> {
        // 关闭发送端, 读回调返回 EOF 后编码器完成收尾
        self.tx = None;
        if self.frames_written == 0 {
            // 空输入不生成视频; Drop 负责删除临时文件
            if let Err(e) = self.join() {
                tracing::debug!("编码线程结束: {:?}", e);
            }
            return Err(SinkError::Empty);
        }
        if let Err(failure) = self.join() {
            return Err(self.failure(failure, SinkError::Finalize));
        }
        let encoded = std::fs::metadata(&self.partial)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !encoded {
            return Err(SinkError::Finalize(format!(
                "编码器没有生成 {}",
                self.partial.display()
            )));
        }

        std::fs::rename(&self.partial, &self.output)?;
        self.published = true;
        tracing::info!(
            "✅ 输出完成: {} ({}帧)",
            self.output.display(),
            self.frames_written
        );
        Ok(self.output.clone())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        // 未成功发布: 等编码线程退出后删除临时文件
        self.tx.take();
        if let Err(e) = self.join() {
            tracing::debug!("编码线程结束: {:?}", e);
        }
        self.discard_partial();
    }
}
