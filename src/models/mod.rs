/// 模型统一接口与实现
///
/// # 架构说明
///
/// - **YOLOv8Obb**: 旋转框检测模型, 包含完整的 preprocess → run → postprocess
///   - 文件: `yolov8_obb.rs`
/// - **SharedModel**: 进程级共享的已加载模型
///   - 首次加载后缓存, 之后每次运行直接复用, 不会重复读取权重
///   - 推理时通过 `Mutex` 串行访问底层 ONNX 会话
///
/// ## 使用示例
/// ```no_run
/// use spark_obb::{models, ModelConfig, Thresholds};
///
/// let model = models::load_shared(&ModelConfig::new("models/spark-obb.onnx"))?;
/// let img = image::open("frame.jpg")?.to_rgb8();
/// let mut guard = model.lock().unwrap();
/// let dets = models::Model::forward(&mut *guard, &[img], &Thresholds::default())?;
/// # Ok::<(), anyhow::Error>(())
/// ```
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use image::RgbImage;
use ndarray::{Array, IxDyn};
use once_cell::sync::OnceCell;

use crate::config::{ModelConfig, Thresholds};
use crate::detection::Detection;
use crate::error::ModelError;

pub mod yolov8_obb;

pub use yolov8_obb::YOLOv8Obb;

/// 统一的检测模型接口
///
/// ## 核心流程
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测结果
/// ```
pub trait Model {
    /// 预处理: 图片 → NCHW 张量
    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>>;

    /// 推理: 执行模型前向传播
    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Array<f32, IxDyn>>;

    /// 后处理: 原始输出 → 每张图片的检测结果
    ///
    /// 阈值由调用方给出, 模型本身不保存任何逐帧状态。
    fn postprocess(
        &self,
        xs: Array<f32, IxDyn>,
        xs0: &[RgbImage],
        thresholds: &Thresholds,
    ) -> Result<Vec<Vec<Detection>>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(
        &mut self,
        images: &[RgbImage],
        thresholds: &Thresholds,
    ) -> Result<Vec<Vec<Detection>>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs, false)?;
        self.postprocess(ys, images, thresholds)
    }

    /// 类别名表
    fn names(&self) -> &[String];

    /// 打印模型信息
    fn summary(&self);
}

/// 进程级共享模型
pub type SharedModel = Arc<Mutex<YOLOv8Obb>>;

static SHARED: OnceCell<(PathBuf, SharedModel)> = OnceCell::new();

/// 加载(或复用已缓存的)模型
///
/// 同一进程只持有一个模型; 加载失败不会被缓存, 下次调用会重新尝试。
/// 已缓存的模型来自另一个文件时返回 [`ModelError::AlreadyLoaded`]。
pub fn load_shared(config: &ModelConfig) -> Result<SharedModel, ModelError> {
    let (path, model) = SHARED.get_or_try_init(|| {
        tracing::info!("📦 加载模型: {}", config.path.display());
        let model = YOLOv8Obb::new(config)?;
        model.summary();
        Ok::<_, ModelError>((config.path.clone(), Arc::new(Mutex::new(model))))
    })?;
    if !same_model(path, &config.path) {
        tracing::error!(
            "❌ 进程内已加载模型 {}, 不能再加载 {}",
            path.display(),
            config.path.display()
        );
        return Err(ModelError::AlreadyLoaded {
            loaded: path.clone(),
            requested: config.path.clone(),
        });
    }
    Ok(Arc::clone(model))
}

/// 已缓存的模型 (未加载时为 None)
pub fn cached() -> Option<SharedModel> {
    SHARED.get().map(|(_, model)| Arc::clone(model))
}

/// 两个路径是否指向同一个模型文件
fn same_model(loaded: &Path, requested: &Path) -> bool {
    if loaded == requested {
        return true;
    }
    match (loaded.canonicalize(), requested.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
