// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端: 会话构建、执行设备选择、模型元数据解析

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use ndarray::{Array, IxDyn};
use once_cell::sync::Lazy;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use regex::Regex;

use crate::error::ModelError;

/// `{0: 'spark', 1: 'smoke'}` 形式的类别表
static NAMES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#).unwrap());
static INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// 执行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    pub intra_threads: usize,
}

impl OrtConfig {
    pub fn new(f: impl Into<PathBuf>, ep: OrtEP) -> Self {
        Self {
            f: f.into(),
            ep,
            intra_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    names: Option<Vec<String>>,
    imgsz: Option<(u32, u32)>,
    task: Option<String>,
    author: Option<String>,
    version: Option<String>,
}

impl OrtBackend {
    /// 加载模型; 文件不存在或无法解析都视为致命错误
    pub fn build(config: OrtConfig) -> Result<Self, ModelError> {
        if !config.f.is_file() {
            return Err(ModelError::NotFound(config.f));
        }

        let session = Self::commit(&config).map_err(|source| ModelError::Corrupt {
            path: config.f.clone(),
            source,
        })?;

        let custom = |key: &str| -> Option<String> {
            let metadata = session.metadata().ok()?;
            metadata.custom(key).ok().flatten()
        };
        let names = custom("names").and_then(|s| parse_names(&s));
        let imgsz = custom("imgsz").and_then(|s| parse_imgsz(&s));
        let task = custom("task");
        let author = custom("author");
        let version = custom("version");

        Ok(Self {
            session,
            ep: config.ep,
            names,
            imgsz,
            task,
            author,
            version,
        })
    }

    fn commit(config: &OrtConfig) -> Result<Session> {
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?;
        if let OrtEP::CUDA(device_id) = config.ep {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()])?;
        }
        Ok(builder.commit_from_file(&config.f)?)
    }

    /// 前向推理, 返回第一个输出张量
    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Array<f32, IxDyn>> {
        let t = Instant::now();
        let input = Tensor::from_array(xs)?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let ys = Array::from_shape_vec(IxDyn(&dims), data.to_vec())?;
        if profile {
            tracing::debug!("[ORT Run]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn names(&self) -> Option<&Vec<String>> {
        self.names.as_ref()
    }

    pub fn imgsz(&self) -> Option<(u32, u32)> {
        self.imgsz
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// 类别号上限, 超出的元数据条目忽略
pub const MAX_CLASSES: usize = 4096;

/// 解析 Ultralytics 导出时写入的 `names` 元数据
pub fn parse_names(s: &str) -> Option<Vec<String>> {
    let mut pairs: Vec<(usize, String)> = NAMES_RE
        .captures_iter(s)
        .filter_map(|c| Some((c[1].parse().ok()?, c[2].to_string())))
        .filter(|(id, name)| {
            if *id >= MAX_CLASSES {
                tracing::warn!("⚠️ 忽略类别 {}: `{}` (类别号超过 {})", id, name, MAX_CLASSES);
            }
            *id < MAX_CLASSES
        })
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by_key(|(id, _)| *id);

    // 类别号不连续时用占位名补齐
    let n = pairs.last().map(|(id, _)| id + 1).unwrap_or(0);
    let mut names: Vec<String> = (0..n).map(|i| format!("class{}", i)).collect();
    for (id, name) in pairs {
        names[id] = name;
    }
    Some(names)
}

/// 解析 `imgsz` 元数据, 例如 `[640, 640]` 或 `1024`; 返回 (height, width)
pub fn parse_imgsz(s: &str) -> Option<(u32, u32)> {
    let dims: Vec<u32> = INT_RE
        .find_iter(s)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    match dims.as_slice() {
        [n] => Some((*n, *n)),
        [h, w, ..] => Some((*h, *w)),
        _ => None,
    }
}
