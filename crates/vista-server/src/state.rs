use crate::catalog::CameraCatalog;
use crate::config::AppConfig;
use crate::distribution::{DetectionFeed, MjpegStreamer, SnapshotService};
use std::sync::Arc;
use vista_capture::CameraManager;
use vista_vision::{DetectionAnnotator, Detector};

/// API 应用状态
#[derive(Clone)]
pub struct AppState {
    /// 摄像头管理器（唯一持有设备句柄）
    pub manager: Arc<CameraManager>,
    /// 摄像头目录
    pub catalog: Arc<dyn CameraCatalog>,
    pub streamer: MjpegStreamer,
    pub snapshots: SnapshotService,
    pub feed: DetectionFeed,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        config: &AppConfig,
        manager: Arc<CameraManager>,
        catalog: Arc<dyn CameraCatalog>,
        detector: Arc<dyn Detector>,
    ) -> Self {
        let annotator = DetectionAnnotator::new(config.stream.jpeg_quality);

        Self {
            streamer: MjpegStreamer::new(manager.clone(), detector.clone(), annotator, &config.stream),
            snapshots: SnapshotService::new(
                manager.clone(),
                detector.clone(),
                annotator,
                config.alerts.overcrowding_threshold,
            ),
            feed: DetectionFeed::new(manager.clone(), detector, annotator, &config.feed),
            manager,
            catalog,
        }
    }
}
