// 单帧快照与按需检测
use super::{analyze_blocking, annotate_blocking};
use crate::error::{ApiError, Result};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use vista_capture::{CameraId, CameraManager, Frame};
use vista_vision::{
    assess_occupancy, DemographicsSummary, Detection, DetectionAnnotator, Detector, OccupancyAlert,
};

/// 检测接口返回体
#[derive(Debug, Clone, Serialize)]
pub struct DetectReport {
    pub detections: Vec<Detection>,
    pub demographics: DemographicsSummary,
    pub count: usize,
    pub alerts: Vec<OccupancyAlert>,
}

#[derive(Clone)]
pub struct SnapshotService {
    manager: Arc<CameraManager>,
    detector: Arc<dyn Detector>,
    annotator: DetectionAnnotator,
    alert_threshold: usize,
}

impl SnapshotService {
    pub fn new(
        manager: Arc<CameraManager>,
        detector: Arc<dyn Detector>,
        annotator: DetectionAnnotator,
        alert_threshold: usize,
    ) -> Self {
        Self {
            manager,
            detector,
            annotator,
            alert_threshold,
        }
    }

    fn latest_frame(&self, camera: CameraId) -> Result<Frame> {
        self.manager
            .get_frame(camera)
            .map(|slot| slot.frame)
            .ok_or_else(|| ApiError::NotFound("No frame available".to_string()))
    }

    /// 当前帧标注后的 JPEG
    pub async fn snapshot(&self, camera: CameraId) -> Result<Bytes> {
        let frame = self.latest_frame(camera)?;
        let annotated = annotate_blocking(self.annotator, self.detector.clone(), frame).await?;
        tracing::debug!(camera, detections = annotated.detections.len(), "Snapshot served");
        Ok(annotated.jpeg)
    }

    /// 当前帧的检测结果
    pub async fn detect(&self, camera: CameraId) -> Result<DetectReport> {
        let frame = self.latest_frame(camera)?;
        self.detect_frame(frame).await
    }

    /// 对任意帧（如上传图片）运行检测
    pub async fn detect_frame(&self, frame: Frame) -> Result<DetectReport> {
        let analysis = analyze_blocking(self.annotator, self.detector.clone(), frame).await?;
        let alerts = assess_occupancy(&analysis.detections, self.alert_threshold);
        for alert in &alerts {
            tracing::warn!(severity = %alert.severity, "{}", alert.message);
        }

        Ok(DetectReport {
            count: analysis.detections.len(),
            detections: analysis.detections,
            demographics: analysis.demographics,
            alerts,
        })
    }
}
