// 帧分发：MJPEG 流、快照、检测推送
use crate::error::{ApiError, Result};
use std::sync::Arc;
use vista_capture::Frame;
use vista_vision::{Analysis, Annotated, DetectionAnnotator, Detector};

pub mod feed;
pub mod mjpeg;
pub mod snapshot;

pub use feed::{DetectionFeed, FeedEnd, FeedMessage, FeedMode, FeedSink, SinkClosed};
pub use mjpeg::MjpegStreamer;
pub use snapshot::{DetectReport, SnapshotService};

/// 在阻塞线程池中检测、绘制并编码
pub(crate) async fn annotate_blocking(
    annotator: DetectionAnnotator,
    detector: Arc<dyn Detector>,
    frame: Frame,
) -> Result<Annotated> {
    tokio::task::spawn_blocking(move || annotator.annotate(&frame, detector.as_ref()))
        .await
        .map_err(|e| ApiError::InternalError(format!("annotation task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// 在阻塞线程池中仅运行检测
pub(crate) async fn analyze_blocking(
    annotator: DetectionAnnotator,
    detector: Arc<dyn Detector>,
    frame: Frame,
) -> Result<Analysis> {
    tokio::task::spawn_blocking(move || annotator.analyze(&frame, detector.as_ref()))
        .await
        .map_err(|e| ApiError::InternalError(format!("detection task failed: {}", e)))?
        .map_err(ApiError::from)
}
