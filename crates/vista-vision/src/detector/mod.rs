// 检测能力接口与内置占位实现
use crate::{DemographicsSummary, Detection, Result};
use serde::Deserialize;
use std::sync::Arc;
use vista_capture::Frame;

mod noop;
mod random;

pub use noop::NoopDetector;
pub use random::RandomDetector;

/// 人员检测与人口属性识别能力
///
/// 实现必须只读使用帧数据；调用方在阻塞线程池中调用 detect。
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;

    fn summarize(&self, detections: &[Detection]) -> DemographicsSummary {
        DemographicsSummary::from_detections(detections)
    }
}

/// 检测器后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    None,
    Random,
}

/// 检测器配置（对应配置文件 [detector]）
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorSettings {
    #[serde(default = "default_backend")]
    pub backend: DetectorBackend,

    /// random 后端每帧最多生成的人数
    #[serde(default = "default_max_people")]
    pub max_people: usize,

    /// 固定随机种子（便于复现）
    #[serde(default)]
    pub seed: Option<u64>,

    /// 被标记为店员的比例（0.0 - 1.0）
    #[serde(default)]
    pub staff_ratio: f64,
}

fn default_backend() -> DetectorBackend {
    DetectorBackend::Random
}

fn default_max_people() -> usize {
    3
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            max_people: default_max_people(),
            seed: None,
            staff_ratio: 0.0,
        }
    }
}

/// 按配置构造检测器
pub fn build_detector(settings: &DetectorSettings) -> Arc<dyn Detector> {
    let detector: Arc<dyn Detector> = match settings.backend {
        DetectorBackend::None => Arc::new(NoopDetector),
        DetectorBackend::Random => Arc::new(RandomDetector::new(
            settings.max_people,
            settings.seed,
            settings.staff_ratio,
        )),
    };
    tracing::info!("Detector backend: {}", detector.name());
    detector
}
