//! 检测器 (Detector)
//! 职责: 输入帧 → YOLO-OBB 检测 → 检测结果 + 绘制好的帧

use std::time::Instant;

use super::types::{Frame, FrameDetections};
use crate::config::Thresholds;
use crate::error::{DetectError, ModelError};
use crate::models::{Model, SharedModel};
use crate::renderer::Annotator;

/// 逐帧检测接口
///
/// 输出帧与输入帧尺寸相同; 同一帧同一阈值多次调用结果一致。
pub trait Detector {
    fn detect(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<FrameDetections, DetectError>;
}

/// 基于共享 YOLOv8-OBB 模型的检测器
pub struct ObbDetector {
    model: SharedModel,
    annotator: Annotator,

    // 统计
    count: u64,
    last: Instant,
    current_fps: f64,
}

impl ObbDetector {
    pub fn new(model: SharedModel, annotator: Annotator) -> Self {
        Self {
            model,
            annotator,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }

    /// 最近一秒的推理帧率
    pub fn fps(&self) -> f64 {
        self.current_fps
    }
}

impl Detector for ObbDetector {
    fn detect(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<FrameDetections, DetectError> {
        let img = frame.to_image()?;

        let detections = {
            let mut model = self.model.lock().map_err(|_| ModelError::Poisoned)?;
            model
                .forward(std::slice::from_ref(&img), thresholds)?
                .pop()
                .unwrap_or_default()
        };

        let annotated = self.annotator.annotate(img, &detections);

        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.current_fps = self.count as f64 / elapsed;
            tracing::debug!("🔍 推理 FPS: {:.1}", self.current_fps);
            self.count = 0;
            self.last = Instant::now();
        }

        Ok(FrameDetections {
            detections,
            annotated: Frame::from_image(frame.index, annotated),
        })
    }
}
