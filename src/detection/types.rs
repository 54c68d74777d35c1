/// 检测系统数据结构定义
/// Data structures for the spark detection pipeline
use std::f32::consts::PI;

use image::RgbImage;
use serde::Serialize;

use crate::error::DetectError;

// ========== 视频帧 ==========

/// 已解码帧 (RGB24, 行紧密排列)
///
/// 由视频源逐帧产生, 写入输出后即丢弃。
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(index: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            data,
        }
    }

    /// 纯色帧 (测试/占位用)
    pub fn filled(index: u64, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(index, width, height, data)
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn to_image(&self) -> Result<RgbImage, DetectError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            DetectError::BadFrame {
                width: self.width,
                height: self.height,
                len: self.data.len(),
            },
        )
    }

    pub fn from_image(index: u64, img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self::new(index, width, height, img.into_raw())
    }
}

// ========== 旋转框 ==========

/// 旋转边界框 (中心点 + 宽高 + 弧度角)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Obb {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub angle: f32,
}

impl Obb {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32, angle: f32) -> Self {
        Self {
            cx,
            cy,
            w,
            h,
            angle,
        }
    }

    /// 规范化: 保证 w >= h, 角度落在 [0, π)
    pub fn regularized(self) -> Self {
        let (w, h, angle) = if self.w >= self.h {
            (self.w, self.h, self.angle)
        } else {
            (self.h, self.w, self.angle + PI / 2.0)
        };
        Self {
            w,
            h,
            angle: angle.rem_euclid(PI),
            ..self
        }
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// 四个角点, 顺时针
    pub fn corners(&self) -> [(f32, f32); 4] {
        let (sin, cos) = self.angle.sin_cos();
        let (v1x, v1y) = (self.w / 2.0 * cos, self.w / 2.0 * sin);
        let (v2x, v2y) = (-self.h / 2.0 * sin, self.h / 2.0 * cos);
        [
            (self.cx + v1x + v2x, self.cy + v1y + v2y),
            (self.cx + v1x - v2x, self.cy + v1y - v2y),
            (self.cx - v1x - v2x, self.cy - v1y - v2y),
            (self.cx - v1x + v2x, self.cy - v1y + v2y),
        ]
    }

    /// 旋转框对应的二维高斯协方差 (a, b, c)
    fn covariance(&self) -> (f32, f32, f32) {
        let a = self.w * self.w / 12.0;
        let b = self.h * self.h / 12.0;
        let (sin, cos) = self.angle.sin_cos();
        (
            a * cos * cos + b * sin * sin,
            a * sin * sin + b * cos * cos,
            (a - b) * cos * sin,
        )
    }

    /// 概率IoU (基于 Bhattacharyya 距离的 Hellinger 相似度)
    ///
    /// 与多边形求交相比对角度变化平滑, 返回值在 [0, 1]。
    pub fn probiou(&self, other: &Obb) -> f32 {
        const EPS: f32 = 1e-7;
        let (a1, b1, c1) = self.covariance();
        let (a2, b2, c2) = other.covariance();
        let (dx, dy) = (self.cx - other.cx, self.cy - other.cy);

        let (sa, sb, sc) = (a1 + a2, b1 + b2, c1 + c2);
        let det = sa * sb - sc * sc;

        let t1 = (sa * dy * dy + sb * dx * dx) / (det + EPS) * 0.25;
        let t2 = (sc * (-dx) * dy) / (det + EPS) * 0.5;
        let t3 = (det
            / (4.0 * ((a1 * b1 - c1 * c1).max(0.0) * (a2 * b2 - c2 * c2).max(0.0)).sqrt() + EPS)
            + EPS)
            .ln()
            * 0.5;

        let bd = (t1 + t2 + t3).clamp(EPS, 100.0);
        let hd = (1.0 - (-bd).exp() + EPS).sqrt();
        (1.0 - hd).clamp(0.0, 1.0)
    }
}

// ========== 检测结果 ==========

/// 单个检测目标, 由检测器产生后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    pub obb: Obb,
}

impl Detection {
    pub fn new(class_id: usize, class_name: impl Into<String>, confidence: f32, obb: Obb) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
            confidence,
            obb,
        }
    }
}

/// 单帧检测输出: 检测列表 + 画好框的帧
#[derive(Debug, Clone)]
pub struct FrameDetections {
    pub detections: Vec<Detection>,
    pub annotated: Frame,
}
