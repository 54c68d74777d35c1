// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8-OBB 旋转框检测模型
// 包含: 模型加载、预处理、推理、后处理

use std::time::Instant;

use anyhow::{bail, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{s, Array, Axis, IxDyn};

use super::Model;
use crate::config::{ModelConfig, Thresholds};
use crate::detection::{Detection, Obb};
use crate::error::ModelError;
use crate::{non_max_suppression, OrtBackend, OrtConfig, OrtEP};

/// 未写入元数据也未指定时的推理尺寸
pub const DEFAULT_IMGSZ: u32 = 640;
/// 前4行是 cx, cy, w, h
const CXYWH_OFFSET: usize = 4;

/// YOLOv8-OBB 模型结构
pub struct YOLOv8Obb {
    engine: OrtBackend,
    height: u32,
    width: u32,
    names: Vec<String>,
    max_det: usize,
    profile: bool,
    resizer: fr::Resizer,
}

impl YOLOv8Obb {
    /// 从配置创建模型
    ///
    /// 推理尺寸: `--imgsz` > 模型元数据 > 640;
    /// 类别名: `--names` > 模型元数据 > `class{id}` 占位。
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let engine = OrtBackend::build(OrtConfig::new(&config.path, config.ep))?;

        if let Some(task) = engine.task() {
            if task != "obb" {
                return Err(ModelError::UnexpectedOutput(format!(
                    "模型任务为 `{}`, 需要 `obb` 模型",
                    task
                )));
            }
        }

        let (height, width) = config
            .imgsz
            .map(|s| (s, s))
            .or(engine.imgsz())
            .unwrap_or((DEFAULT_IMGSZ, DEFAULT_IMGSZ));

        let names = config
            .names
            .clone()
            .or_else(|| engine.names().cloned())
            .unwrap_or_default();

        Ok(Self {
            engine,
            height,
            width,
            names,
            max_det: config.max_det,
            profile: config.profile,
            resizer: fr::Resizer::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 带分阶段计时的 forward
    pub fn detect(&mut self, images: &[RgbImage], thresholds: &Thresholds) -> Result<Vec<Vec<Detection>>> {
        let t_pre = Instant::now();
        let xs = self.preprocess(images)?;
        if self.profile {
            tracing::info!("[Model Preprocess]: {:?}", t_pre.elapsed());
        }

        let t_run = Instant::now();
        let ys = self.run(xs, self.profile)?;
        if self.profile {
            tracing::info!("[Model Inference]: {:?}", t_run.elapsed());
        }

        let t_post = Instant::now();
        let ys = self.postprocess(ys, images, thresholds)?;
        if self.profile {
            tracing::info!("[Model Postprocess]: {:?}", t_post.elapsed());
        }

        Ok(ys)
    }
}

impl Model for YOLOv8Obb {
    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>> {
        letterbox(&mut self.resizer, images, self.height, self.width)
    }

    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Array<f32, IxDyn>> {
        self.engine.run(xs, profile)
    }

    fn postprocess(
        &self,
        xs: Array<f32, IxDyn>,
        xs0: &[RgbImage],
        thresholds: &Thresholds,
    ) -> Result<Vec<Vec<Detection>>> {
        let dims: Vec<(u32, u32)> = xs0.iter().map(|img| img.dimensions()).collect();
        decode(
            &xs,
            &dims,
            (self.width, self.height),
            &self.names,
            thresholds,
            self.max_det,
        )
    }

    fn forward(&mut self, images: &[RgbImage], thresholds: &Thresholds) -> Result<Vec<Vec<Detection>>> {
        self.detect(images, thresholds)
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn summary(&self) {
        tracing::info!(
            "📋 Summary: Task: obb{} | EP: {:?} {}| Height: {}, Width: {} | nc: {}, max_det: {}",
            match self.engine.author().zip(self.engine.version()) {
                Some((author, ver)) => format!(" ({} {})", author, ver),
                None => String::from(""),
            },
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                "(May still fall back to CPU) "
            },
            self.height,
            self.width,
            self.names.len(),
            self.max_det,
        );
    }
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 等比缩放后贴在左上角, 其余区域填 144/255, 输出 NCHW
pub fn letterbox(
    resizer: &mut fr::Resizer,
    images: &[RgbImage],
    height: u32,
    width: u32,
) -> Result<Array<f32, IxDyn>> {
    let mut ys = Array::ones((images.len(), 3, height as usize, width as usize)).into_dyn();
    ys.fill(144.0 / 255.0);

    for (idx, img) in images.iter().enumerate() {
        let (w0, h0) = img.dimensions();
        if w0 == 0 || h0 == 0 {
            bail!("空图像: {}x{}", w0, h0);
        }
        let (_, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, width as f32, height as f32);
        let (w_new, h_new) = ((w_new as u32).clamp(1, width), (h_new as u32).clamp(1, height));

        let src = fr::images::Image::from_vec_u8(w0, h0, img.as_raw().clone(), fr::PixelType::U8x3)?;
        let mut dst = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
        resizer.resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )?;

        for (i, rgb) in dst.buffer().chunks_exact(3).enumerate() {
            let x = i % w_new as usize;
            let y = i / w_new as usize;
            ys[[idx, 0, y, x]] = rgb[0] as f32 / 255.0;
            ys[[idx, 1, y, x]] = rgb[1] as f32 / 255.0;
            ys[[idx, 2, y, x]] = rgb[2] as f32 / 255.0;
        }
    }

    Ok(ys)
}

/// 解码 OBB 输出 `[batch, 4 + nc + 1, anchors]`
///
/// 每列依次为 cx, cy, w, h, nc 个类别分数, 最后一行是弧度角。
/// 坐标按 letterbox 比例还原到原图, 再做置信度过滤、旋转框 NMS 与 max_det 截断。
pub fn decode(
    xs: &Array<f32, IxDyn>,
    xs0: &[(u32, u32)],
    input: (u32, u32),
    names: &[String],
    thresholds: &Thresholds,
    max_det: usize,
) -> Result<Vec<Vec<Detection>>> {
    let shape = xs.shape();
    if shape.len() != 3 || shape[1] < CXYWH_OFFSET + 2 {
        bail!(ModelError::UnexpectedOutput(format!(
            "OBB 输出形状应为 [batch, 4+nc+1, anchors], 实际为 {:?}",
            shape
        )));
    }
    if shape[0] != xs0.len() {
        bail!(ModelError::UnexpectedOutput(format!(
            "输出 batch {} 与输入图片数 {} 不一致",
            shape[0],
            xs0.len()
        )));
    }
    let nc = shape[1] - CXYWH_OFFSET - 1;

    let mut ys = Vec::with_capacity(xs0.len());
    for (idx, anchor) in xs.axis_iter(Axis(0)).enumerate() {
        let (w0, h0) = (xs0[idx].0 as f32, xs0[idx].1 as f32);
        let ratio = (input.0 as f32 / w0).min(input.1 as f32 / h0);

        let mut data: Vec<Detection> = Vec::new();
        for pred in anchor.axis_iter(Axis(1)) {
            let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);
            let Some((id, &confidence)) = clss
                .into_iter()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max })
            else {
                continue;
            };

            if confidence < thresholds.conf {
                continue;
            }

            let obb = Obb::new(
                pred[0] / ratio,
                pred[1] / ratio,
                pred[2] / ratio,
                pred[3] / ratio,
                pred[CXYWH_OFFSET + nc],
            )
            .regularized();

            let name = names
                .get(id)
                .cloned()
                .unwrap_or_else(|| format!("class{}", id));
            data.push(Detection::new(id, name, confidence, obb));
        }

        non_max_suppression(&mut data, thresholds.iou);
        data.truncate(max_det);
        ys.push(data);
    }

    Ok(ys)
}
