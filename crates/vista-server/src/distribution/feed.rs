// 检测结果推送（与传输层无关）
use super::analyze_blocking;
use crate::config::{FeedModeKind, FeedSettings};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use vista_capture::{CameraId, CameraManager};
use vista_vision::{DemographicsSummary, Detection, DetectionAnnotator, Detector};

/// 推送消息（按 type 字段区分）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedMessage {
    #[serde(rename_all = "camelCase")]
    Status { message: String, camera_index: u32 },
    #[serde(rename_all = "camelCase")]
    Detection {
        camera_index: u32,
        detections: Vec<Detection>,
        demographics: DemographicsSummary,
        /// Unix 秒（含小数）
        timestamp: f64,
    },
}

#[derive(Error, Debug)]
#[error("feed transport closed: {0}")]
pub struct SinkClosed(pub String);

/// 消息出口（WebSocket 等）
#[async_trait]
pub trait FeedSink: Send {
    async fn send(&mut self, message: FeedMessage) -> Result<(), SinkClosed>;
}

/// 推送结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEnd {
    /// 连接时摄像头未激活
    CameraInactive,
    /// 客户端断开或发送失败
    TransportClosed,
}

/// 推送模式
#[derive(Debug, Clone, Copy)]
pub enum FeedMode {
    /// 轮询 + 跳帧 + 等待提示
    Keepalive {
        poll_interval: Duration,
        frame_skip: u32,
        keepalive_after: u32,
    },
    /// 固定间隔，有帧即推送
    FixedInterval { interval: Duration },
}

impl From<&FeedSettings> for FeedMode {
    fn from(settings: &FeedSettings) -> Self {
        match settings.mode {
            FeedModeKind::Keepalive => FeedMode::Keepalive {
                poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
                frame_skip: settings.frame_skip.max(1),
                keepalive_after: settings.keepalive_after,
            },
            FeedModeKind::Fixed => FeedMode::FixedInterval {
                interval: Duration::from_millis(settings.fixed_interval_ms.max(1)),
            },
        }
    }
}

/// 检测推送服务
///
/// 每个客户端一个会话。会话内的检测失败只记录并跳过本轮，不影响采集或其他会话。
#[derive(Clone)]
pub struct DetectionFeed {
    manager: Arc<CameraManager>,
    detector: Arc<dyn Detector>,
    annotator: DetectionAnnotator,
    mode: FeedMode,
}

impl DetectionFeed {
    pub fn new(
        manager: Arc<CameraManager>,
        detector: Arc<dyn Detector>,
        annotator: DetectionAnnotator,
        settings: &FeedSettings,
    ) -> Self {
        Self::with_mode(manager, detector, annotator, FeedMode::from(settings))
    }

    pub fn with_mode(
        manager: Arc<CameraManager>,
        detector: Arc<dyn Detector>,
        annotator: DetectionAnnotator,
        mode: FeedMode,
    ) -> Self {
        Self {
            manager,
            detector,
            annotator,
            mode,
        }
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    /// 运行推送会话直到客户端断开
    pub async fn run<S: FeedSink + ?Sized>(&self, camera: CameraId, sink: &mut S) -> FeedEnd {
        tracing::info!(camera, mode = ?self.mode, "Detection feed started");
        let end = match self.mode {
            FeedMode::Keepalive {
                poll_interval,
                frame_skip,
                keepalive_after,
            } => {
                self.run_keepalive(camera, sink, poll_interval, frame_skip, keepalive_after)
                    .await
            }
            FeedMode::FixedInterval { interval } => self.run_fixed(camera, sink, interval).await,
        };
        tracing::info!(camera, reason = ?end, "Detection feed ended");
        end
    }

    async fn run_keepalive<S: FeedSink + ?Sized>(
        &self,
        camera: CameraId,
        sink: &mut S,
        poll_interval: Duration,
        frame_skip: u32,
        keepalive_after: u32,
    ) -> FeedEnd {
        if !self.manager.is_active(camera) {
            let _ = sink
                .send(FeedMessage::Status {
                    message: format!("Camera {} not available", camera),
                    camera_index: camera,
                })
                .await;
            return FeedEnd::CameraInactive;
        }

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut misses: u32 = 0;
        let mut skip_counter: u32 = 0;

        loop {
            ticker.tick().await;

            let slot = match self.manager.get_frame(camera) {
                Some(slot) => slot,
                None => {
                    misses += 1;
                    if misses > keepalive_after {
                        misses = 0;
                        let message = FeedMessage::Status {
                            message: "Waiting for frame".to_string(),
                            camera_index: camera,
                        };
                        if let Err(e) = sink.send(message).await {
                            tracing::debug!(camera, "{}", e);
                            return FeedEnd::TransportClosed;
                        }
                    }
                    continue;
                }
            };

            skip_counter = (skip_counter + 1) % frame_skip;
            if skip_counter != 0 {
                continue;
            }

            let Some(message) = self.detection_message(camera, slot.frame).await else {
                continue;
            };
            if let Err(e) = sink.send(message).await {
                tracing::debug!(camera, "{}", e);
                return FeedEnd::TransportClosed;
            }
            misses = 0;
        }
    }

    async fn run_fixed<S: FeedSink + ?Sized>(
        &self,
        camera: CameraId,
        sink: &mut S,
        interval: Duration,
    ) -> FeedEnd {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(slot) = self.manager.get_frame(camera) else {
                continue;
            };
            let Some(message) = self.detection_message(camera, slot.frame).await else {
                continue;
            };
            if let Err(e) = sink.send(message).await {
                tracing::debug!(camera, "{}", e);
                return FeedEnd::TransportClosed;
            }
        }
    }

    /// 检测失败（含检测任务 panic）时返回 None
    async fn detection_message(
        &self,
        camera: CameraId,
        frame: vista_capture::Frame,
    ) -> Option<FeedMessage> {
        match analyze_blocking(self.annotator, self.detector.clone(), frame).await {
            Ok(analysis) => Some(FeedMessage::Detection {
                camera_index: camera,
                detections: analysis.detections,
                demographics: analysis.demographics,
                timestamp: unix_seconds(),
            }),
            Err(e) => {
                tracing::warn!(camera, "Detection cycle skipped: {}", e);
                None
            }
        }
    }
}

fn unix_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
