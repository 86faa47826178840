// vista-vision: 检测数据模型、检测能力接口、叠加绘制与编码

pub mod alerts;
pub mod annotate;
pub mod decode;
pub mod detection;
pub mod detector;
pub mod error;
mod font;

pub use alerts::{assess_occupancy, OccupancyAlert, DEFAULT_OVERCROWDING_THRESHOLD};
pub use annotate::{Analysis, Annotated, DetectionAnnotator};
pub use decode::decode_image;
pub use detection::{AgeRange, BoundingBox, DemographicsSummary, Detection, Gender};
pub use detector::{
    build_detector, Detector, DetectorBackend, DetectorSettings, NoopDetector, RandomDetector,
};
pub use error::{Result, VisionError};
