/// 检测系统 (Detection System)
///
/// - Detector: 逐帧推理 + 绘制检测框
/// - Tally:    按类别名统计目标数量
pub mod detector;
pub mod tally;
pub mod types;

pub use detector::{Detector, ObbDetector};
pub use tally::Tally;
pub use types::{Detection, Frame, FrameDetections, Obb};
