#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行与运行配置
pub mod detection; // 检测器、检测结果与计数
pub mod error; // 错误类型
pub mod input; // 视频输入(解码)
pub mod logging; // 日志初始化
pub mod models; // 模型接口与 YOLOv8-OBB 实现
pub mod output; // 视频输出(编码)
pub mod pipeline; // 逐帧处理流水线
pub mod renderer; // 检测框绘制

pub mod ort_backend;

pub use crate::config::{Args, ModelConfig, RunConfig, Thresholds};
pub use crate::detection::{Detection, Detector, Frame, FrameDetections, Obb, ObbDetector, Tally};
pub use crate::error::{
    ConfigError, DetectError, ModelError, PipelineError, PipelineResult, SinkError, SourceError,
};
pub use crate::input::{FfmpegSource, VideoInfo, VideoSource};
pub use crate::models::{Model, SharedModel, YOLOv8Obb};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::output::{FfmpegSink, VideoSink};
pub use crate::pipeline::{process, ProgressObserver, RunSummary, SparkPipeline};
pub use crate::renderer::Annotator;

/// 旋转框非极大值抑制
///
/// 按置信度从高到低贪心保留; 同类别且 probiou 超过阈值的低分框被丢弃,
/// 不同类别之间互不抑制。
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|d1, d2| d2.confidence.total_cmp(&d1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id != xs[index].class_id {
                continue;
            }
            let iou = xs[prev_index].obb.probiou(&xs[index].obb);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: usize, confidence: f32, cx: f32) -> Detection {
        Detection::new(
            class_id,
            format!("class{}", class_id),
            confidence,
            Obb::new(cx, 100.0, 40.0, 12.0, 0.2),
        )
    }

    #[test]
    fn test_nms_keeps_highest_of_overlapping() {
        let mut xs = vec![det(0, 0.5, 100.0), det(0, 0.9, 101.0), det(0, 0.7, 300.0)];
        non_max_suppression(&mut xs, 0.4);
        let confs: Vec<f32> = xs.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.9, 0.7]);
    }

    #[test]
    fn test_nms_is_per_class() {
        let mut xs = vec![det(0, 0.9, 100.0), det(1, 0.8, 100.0)];
        non_max_suppression(&mut xs, 0.4);
        assert_eq!(xs.len(), 2);
    }

    #[test]
    fn test_nms_threshold_one_keeps_everything() {
        let mut xs = vec![det(0, 0.9, 100.0), det(0, 0.8, 100.0)];
        non_max_suppression(&mut xs, 1.0);
        assert_eq!(xs.len(), 2);
    }

    #[test]
    fn test_nms_empty() {
        let mut xs: Vec<Detection> = Vec::new();
        non_max_suppression(&mut xs, 0.4);
        assert!(xs.is_empty());
    }
}
