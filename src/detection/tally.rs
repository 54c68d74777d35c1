use std::collections::BTreeMap;

use serde::Serialize;

use crate::detection::Detection;

/// 目标计数器
///
/// 类别名包含目标名(不区分大小写)即计数, 例如目标 `spark` 会匹配
/// `spark`, `Spark-Large`, `big_spark`。同一火花出现在多帧中会被多次计数。
#[derive(Debug, Clone, Serialize)]
pub struct Tally {
    target: String,
    count: u64,
    class_totals: BTreeMap<String, u64>,
}

impl Tally {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_lowercase(),
            count: 0,
            class_totals: BTreeMap::new(),
        }
    }

    pub fn matches(&self, class_name: &str) -> bool {
        class_name.to_lowercase().contains(&self.target)
    }

    /// 累加一帧的检测结果, 返回当前总数
    pub fn observe(&mut self, detections: &[Detection]) -> u64 {
        for d in detections {
            *self.class_totals.entry(d.class_name.clone()).or_insert(0) += 1;
            if self.matches(&d.class_name) {
                self.count += 1;
            }
        }
        self.count
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// 各类别检测总数 (不限于目标类别)
    pub fn class_totals(&self) -> &BTreeMap<String, u64> {
        &self.class_totals
    }
}
