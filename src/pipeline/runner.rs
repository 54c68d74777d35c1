use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;

use super::progress::{Progress, ProgressObserver};
use super::RunSummary;
use crate::config::{RunConfig, Thresholds};
use crate::detection::{Detector, FrameDetections, ObbDetector, Tally};
use crate::error::{ConfigError, PipelineError, PipelineResult};
use crate::input::{FfmpegSource, VideoSource};
use crate::models::SharedModel;
use crate::output::{FfmpegSink, VideoSink};
use crate::renderer::Annotator;

/// 逐帧处理: 读帧 → 检测 → 计数 → 写帧
///
/// - 输出帧数与读出帧数一致, 顺序不变
/// - 检测或写入失败立即中止, sink 被丢弃, 不会发布输出文件
/// - 第一帧之前解码失败视为打开失败, 同样不发布输出
/// - 已处理若干帧后解码失败: 发布已写入的部分, 返回 [`PipelineError::Incomplete`]
pub fn process<S, K, D>(
    source: &mut S,
    mut sink: K,
    detector: &mut D,
    thresholds: &Thresholds,
    target: &str,
    observer: &mut dyn ProgressObserver,
) -> PipelineResult<RunSummary>
where
    S: VideoSource + ?Sized,
    K: VideoSink,
    D: Detector + ?Sized,
{
    let started = Instant::now();
    let frame_count = source.info().frame_count;
    let mut tally = Tally::new(target);
    let mut progress = Progress::new(frame_count);
    let mut frames_processed = 0u64;

    let summary = |tally: &Tally,
                   frames_processed: u64,
                   frames_written: u64,
                   output_path: PathBuf,
                   completed: bool| RunSummary {
        frames_processed,
        frames_written,
        spark_count: tally.count(),
        target: tally.target().to_string(),
        class_totals: tally.class_totals().clone(),
        frame_count_estimate: frame_count,
        output_path,
        completed,
        elapsed_secs: started.elapsed().as_secs_f64(),
        finished_at: Local::now(),
    };

    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(cause) if frames_processed == 0 => {
                tracing::error!("❌ 视频读取失败: {}", cause);
                return Err(cause.into());
            }
            Err(cause) => {
                tracing::error!("❌ 第 {} 帧后解码失败: {}", frames_processed, cause);
                let frames_written = sink.frames_written();
                let output_path = sink.finish()?;
                let partial = summary(&tally, frames_processed, frames_written, output_path, false);
                tracing::warn!(
                    "⚠️ 已输出前 {} 帧: {}",
                    partial.frames_written,
                    partial.output_path.display()
                );
                return Err(PipelineError::Incomplete {
                    summary: Box::new(partial),
                    cause,
                });
            }
        };

        let index = frame.index;
        let FrameDetections {
            detections,
            annotated,
        } = detector
            .detect(&frame, thresholds)
            .map_err(|source| PipelineError::Detect {
                frame: index,
                source,
            })?;
        drop(frame);

        let count = tally.observe(&detections);
        if !detections.is_empty() {
            tracing::debug!("🔥 帧 {}: {} 个检测, 累计 {}", index, detections.len(), count);
        }

        sink.write(annotated)?;
        frames_processed += 1;
        observer.on_progress(progress.advance(), frames_processed);
    }

    let frames_written = sink.frames_written();
    debug_assert_eq!(frames_written, frames_processed);
    let output_path = sink.finish()?;

    observer.on_progress(1.0, frames_processed);
    let summary = summary(&tally, frames_processed, frames_written, output_path, true);
    observer.on_finish(&summary);
    Ok(summary)
}

/// 火花检测流水线: 持有已加载的模型, 可多次运行
pub struct SparkPipeline {
    model: SharedModel,
    annotator: Annotator,
    config: RunConfig,
}

impl SparkPipeline {
    /// 字体找不到时返回错误, 不会生成缺少标签的视频
    pub fn new(model: SharedModel, config: RunConfig) -> Result<Self, ConfigError> {
        let annotator = Annotator::new(config.font.as_deref())?;
        Ok(Self {
            model,
            annotator,
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// 处理一个视频文件
    ///
    /// 先打开视频源再创建输出, 输入无法打开时不会产生输出文件。
    pub fn run(
        &self,
        video: &Path,
        thresholds: &Thresholds,
        observer: &mut dyn ProgressObserver,
    ) -> PipelineResult<RunSummary> {
        let mut source = FfmpegSource::open(video)?;
        let sink = FfmpegSink::create(&self.config.output, source.info())?;
        let mut detector = ObbDetector::new(self.model.clone(), self.annotator.clone());

        tracing::info!(
            "🚀 开始检测: conf={}, iou={}, 目标=`{}`",
            thresholds.conf,
            thresholds.iou,
            self.config.target
        );
        let summary = process(
            &mut source,
            sink,
            &mut detector,
            thresholds,
            &self.config.target,
            observer,
        )?;
        tracing::info!(
            "✅ 检测完成: {} 帧, 火花总数 {}, 用时 {:.1}s",
            summary.frames_processed,
            summary.spark_count,
            summary.elapsed_secs
        );
        Ok(summary)
    }
}
