// 客流告警
use crate::Detection;
use serde::Serialize;

/// 超过该人数触发拥挤告警
pub const DEFAULT_OVERCROWDING_THRESHOLD: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyAlert {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub message: String,
    pub confidence: f32,
}

/// 根据本帧人数判断是否拥挤
pub fn assess_occupancy(detections: &[Detection], threshold: usize) -> Vec<OccupancyAlert> {
    let mut alerts = Vec::new();

    if detections.len() > threshold {
        alerts.push(OccupancyAlert {
            kind: "overcrowding".to_string(),
            severity: "high".to_string(),
            message: format!("High occupancy detected: {} people", detections.len()),
            confidence: 0.95,
        });
    }

    alerts
}
