// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测结果绘制: 旋转框 + 类别/置信度标签

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detection::Detection;
use crate::error::ConfigError;

/// 调色板, 按类别号循环取色
const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

/// 依次尝试的系统字体
const FONT_CANDIDATES: [&str; 6] = [
    "assets/font/msyh.ttc",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// 检测框绘制器
///
/// 标签文字是输出的一部分, 构造时必须拿到字体, 否则启动即失败。
#[derive(Clone)]
pub struct Annotator {
    font: Option<FontArc>,
    thickness: i32,
}

impl Annotator {
    /// `font`: 用户指定字体, 为 None 时在常见位置查找
    ///
    /// 用户指定的字体加载失败时直接报错, 不会退回系统字体。
    pub fn new(font: Option<&Path>) -> Result<Self, ConfigError> {
        let font = match font {
            Some(path) => load_font(path)?,
            None => find_system_font()?,
        };
        Ok(Self {
            font: Some(font),
            thickness: 2,
        })
    }

    /// 不带字体 (只画框), 仅供测试
    #[cfg(test)]
    pub(crate) fn without_font() -> Self {
        Self {
            font: None,
            thickness: 2,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn color(class_id: usize) -> Rgb<u8> {
        let (r, g, b) = BRIGHT_COLORS[class_id % BRIGHT_COLORS.len()];
        Rgb([r, g, b])
    }

    /// 在图像上绘制所有检测, 尺寸保持不变
    pub fn annotate(&self, mut img: RgbImage, detections: &[Detection]) -> RgbImage {
        if img.width() == 0 || img.height() == 0 {
            return img;
        }
        let scale = label_scale(img.width(), img.height());

        for d in detections {
            let color = Self::color(d.class_id);
            let corners = d.obb.corners();

            for i in 0..4 {
                let (x0, y0) = corners[i];
                let (x1, y1) = corners[(i + 1) % 4];
                // 偏移重画加粗
                for o in -(self.thickness / 2)..=(self.thickness / 2) {
                    let o = o as f32;
                    draw_line_segment_mut(&mut img, (x0 + o, y0), (x1 + o, y1), color);
                    draw_line_segment_mut(&mut img, (x0, y0 + o), (x1, y1 + o), color);
                }
            }

            if let Some(font) = &self.font {
                let label = format!("{} {:.2}", d.class_name, d.confidence);
                let (tw, th) = text_size(scale, font, &label);
                // 标签贴在最上方的角点上
                let (lx, ly) = corners
                    .iter()
                    .copied()
                    .fold((f32::MAX, f32::MAX), |acc, p| if p.1 < acc.1 { p } else { acc });
                let x = (lx as i32).clamp(0, img.width() as i32 - 1);
                let y = (ly as i32 - th as i32 - 4).max(0);
                draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(tw + 4, th + 4), color);
                draw_text_mut(&mut img, Rgb([255, 255, 255]), x + 2, y + 2, scale, font, &label);
            }
        }

        img
    }
}

fn label_scale(width: u32, height: u32) -> PxScale {
    PxScale::from((width.max(height) as f32 / 60.0).clamp(14.0, 40.0))
}

fn load_font(path: &Path) -> Result<FontArc, ConfigError> {
    let err = |reason: String| ConfigError::Font {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| err(e.to_string()))?;
    let font = FontArc::try_from_vec(bytes).map_err(|e| err(e.to_string()))?;
    tracing::debug!("🔤 字体: {}", path.display());
    Ok(font)
}

fn font_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = FONT_CANDIDATES.iter().map(PathBuf::from).collect();
    if let Some(dir) = dirs::font_dir() {
        candidates.push(dir.join("DejaVuSans.ttf"));
        candidates.push(dir.join("Arial.ttf"));
    }
    candidates
}

fn find_system_font() -> Result<FontArc, ConfigError> {
    let candidates = font_candidates();
    for path in candidates.iter().filter(|p| p.is_file()) {
        match load_font(path) {
            Ok(font) => return Ok(font),
            Err(e) => tracing::warn!("⚠️ {}", e),
        }
    }
    let tried: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
    Err(ConfigError::NoFont(tried.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Obb;

    #[test]
    fn test_annotate_keeps_dimensions() {
        let img = RgbImage::new(320, 240);
        let dets = vec![
            Detection::new(0, "spark", 0.9, Obb::new(100.0, 80.0, 60.0, 20.0, 0.5)),
            // 超出画面的框也不能越界
            Detection::new(3, "spark", 0.5, Obb::new(330.0, -10.0, 80.0, 40.0, 1.0)),
        ];
        let out = Annotator::without_font().annotate(img, &dets);
        assert_eq!(out.dimensions(), (320, 240));
    }

    #[test]
    fn test_annotate_draws_box_color() {
        let img = RgbImage::new(200, 200);
        let dets = vec![Detection::new(
            1,
            "spark",
            0.8,
            Obb::new(100.0, 100.0, 80.0, 40.0, 0.0),
        )];
        let out = Annotator::without_font().annotate(img, &dets);
        // 上边 y = 80
        assert_eq!(*out.get_pixel(100, 80), Annotator::color(1));
        // 框内部未被填充
        assert_eq!(*out.get_pixel(100, 100), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_no_detections_is_identity() {
        let img = RgbImage::from_pixel(16, 8, Rgb([1, 2, 3]));
        let out = Annotator::without_font().annotate(img.clone(), &[]);
        assert_eq!(out, img);
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ttf");
        match Annotator::new(Some(&path)) {
            Err(ConfigError::Font { path: p, .. }) => assert_eq!(p, path),
            other => panic!("期望字体错误, 实际 {:?}", other.map(|a| a.has_font())),
        }
    }

    #[test]
    fn test_invalid_font_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(
            Annotator::new(Some(&path)),
            Err(ConfigError::Font { .. })
        ));
    }

    #[test]
    fn test_loaded_annotator_has_font() {
        // 没有系统字体的环境下必须报错而不是静默去掉标签
        match Annotator::new(None) {
            Ok(a) => assert!(a.has_font()),
            Err(e) => assert!(matches!(e, ConfigError::NoFont(_))),
        }
    }

    #[test]
    fn test_palette_cycles() {
        assert_eq!(Annotator::color(0), Annotator::color(12));
        assert_ne!(Annotator::color(0), Annotator::color(1));
    }
}
