// 命令行参数与运行配置
use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use crate::error::ConfigError;
use crate::ort_backend::OrtEP;

/// 默认模型路径 (固定的本地权重文件)
pub const DEFAULT_MODEL: &str = "models/spark-obb.onnx";
/// 默认输出路径, 每次运行都会覆盖
pub const DEFAULT_OUTPUT: &str = "output_sparks.mp4";
/// 默认统计的目标类别
pub const DEFAULT_TARGET: &str = "spark";

/// 火花检测参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "视频火花检测 (YOLOv8-OBB)", long_about = None)]
pub struct Args {
    /// ONNX 模型路径
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: PathBuf,

    /// 输入视频 (mp4/avi/mov)
    #[arg(short, long)]
    pub source: PathBuf,

    /// 输出视频
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// 置信度阈值
    #[arg(long, default_value_t = 0.3)]
    pub conf: f32,

    /// NMS IoU阈值
    #[arg(long, default_value_t = 0.4)]
    pub iou: f32,

    /// 统计的类别名(子串匹配, 不区分大小写)
    #[arg(long, default_value = DEFAULT_TARGET)]
    pub target: String,

    /// 类别名 (逗号分隔), 覆盖模型元数据
    #[arg(long, value_delimiter = ',')]
    pub names: Option<Vec<String>>,

    /// 推理尺寸, 默认读取模型元数据
    #[arg(long)]
    pub imgsz: Option<u32>,

    /// 每帧最多保留的检测数
    #[arg(long, default_value_t = 300)]
    pub max_det: usize,

    /// 标签字体 (ttf/otf)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 使用 CUDA
    #[arg(long)]
    pub cuda: bool,

    /// GPU 设备号
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 打印每帧各阶段耗时
    #[arg(long)]
    pub profile: bool,

    /// 以 JSON 输出运行结果
    #[arg(long)]
    pub json: bool,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(self.conf, self.iou)
    }

    pub fn ep(&self) -> OrtEP {
        if self.cuda {
            OrtEP::CUDA(self.device_id)
        } else {
            OrtEP::CPU
        }
    }

    pub fn model_config(&self) -> Result<ModelConfig, ConfigError> {
        if let Some(imgsz) = self.imgsz {
            if imgsz == 0 || imgsz % 32 != 0 {
                return Err(ConfigError::InvalidImageSize(imgsz));
            }
        }
        Ok(ModelConfig {
            path: self.model.clone(),
            ep: self.ep(),
            imgsz: self.imgsz,
            names: self.names.clone(),
            max_det: self.max_det,
            profile: self.profile,
        })
    }

    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        let target = self.target.trim();
        if target.is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        Ok(RunConfig {
            output: self.output.clone(),
            target: target.to_string(),
            font: self.font.clone(),
        })
    }
}

/// 检测阈值: 置信度 + 旋转框 NMS 的重叠阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub conf: f32,
    pub iou: f32,
}

impl Thresholds {
    pub fn new(conf: f32, iou: f32) -> Result<Self, ConfigError> {
        for (name, value) in [("conf", conf), ("iou", iou)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        Ok(Self { conf, iou })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            conf: 0.3,
            iou: 0.4,
        }
    }
}

/// 模型加载配置
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub ep: OrtEP,
    pub imgsz: Option<u32>,
    pub names: Option<Vec<String>>,
    pub max_det: usize,
    pub profile: bool,
}

impl ModelConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ep: OrtEP::CPU,
            imgsz: None,
            names: None,
            max_det: 300,
            profile: false,
        }
    }
}

/// 单次运行配置
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output: PathBuf,
    pub target: String,
    pub font: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            target: DEFAULT_TARGET.to_string(),
            font: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["spark-detect", "-s", "clip.mp4"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let th = args.thresholds().unwrap();
        assert_eq!(th, Thresholds { conf: 0.3, iou: 0.4 });
        assert_eq!(args.output, PathBuf::from("output_sparks.mp4"));
        assert_eq!(args.run_config().unwrap().target, "spark");
        assert!(matches!(args.ep(), OrtEP::CPU));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let args = parse(&["--conf", "1.5"]);
        assert!(matches!(
            args.thresholds(),
            Err(ConfigError::ThresholdOutOfRange { name: "conf", .. })
        ));
        assert!(Thresholds::new(0.25, -0.1).is_err());
        assert!(Thresholds::new(0.0, 1.0).is_ok());
    }

    #[test]
    fn test_names_and_imgsz() {
        let args = parse(&["--names", "spark,smoke", "--imgsz", "1024", "--cuda"]);
        let cfg = args.model_config().unwrap();
        assert_eq!(cfg.names.unwrap(), vec!["spark", "smoke"]);
        assert_eq!(cfg.imgsz, Some(1024));
        assert!(matches!(cfg.ep, OrtEP::CUDA(0)));

        let args = parse(&["--imgsz", "500"]);
        assert!(matches!(
            args.model_config(),
            Err(ConfigError::InvalidImageSize(500))
        ));
    }

    #[test]
    fn test_empty_target_rejected() {
        let args = parse(&["--target", "  "]);
        assert!(matches!(args.run_config(), Err(ConfigError::EmptyTarget)));
    }
}
