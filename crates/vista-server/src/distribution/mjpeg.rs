// MJPEG 拉流
use super::annotate_blocking;
use crate::config::StreamSettings;
use crate::error::{ApiError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::Duration;
use vista_capture::{CameraId, CameraManager};
use vista_vision::{DetectionAnnotator, Detector};

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// MJPEG 推流器
///
/// 每个连接独立轮询最新帧，序号未变化时不重复编码。
/// 取帧返回 None（摄像头已移除）时结束流；客户端断开时流被丢弃。
#[derive(Clone)]
pub struct MjpegStreamer {
    manager: Arc<CameraManager>,
    detector: Arc<dyn Detector>,
    annotator: DetectionAnnotator,
    idle_poll: Duration,
}

struct StreamCursor {
    streamer: MjpegStreamer,
    camera: CameraId,
    last_sequence: u64,
    parts: u64,
}

impl MjpegStreamer {
    pub fn new(
        manager: Arc<CameraManager>,
        detector: Arc<dyn Detector>,
        annotator: DetectionAnnotator,
        settings: &StreamSettings,
    ) -> Self {
        Self {
            manager,
            detector,
            annotator,
            idle_poll: Duration::from_millis(settings.idle_poll_ms.max(1)),
        }
    }

    /// 打开 MJPEG 流；摄像头未激活时返回 NotFound
    pub fn open(
        &self,
        camera: CameraId,
    ) -> Result<impl Stream<Item = std::io::Result<Bytes>> + Send + 'static> {
        if !self.manager.is_active(camera) {
            return Err(ApiError::NotFound("Camera not active".to_string()));
        }

        tracing::info!(camera, "MJPEG stream opened");
        let cursor = StreamCursor {
            streamer: self.clone(),
            camera,
            last_sequence: 0,
            parts: 0,
        };

        Ok(stream::unfold(cursor, |mut cursor| async move {
            let part = cursor.next_part().await?;
            Some((Ok(part), cursor))
        }))
    }
}

impl StreamCursor {
    async fn next_part(&mut self) -> Option<Bytes> {
        let streamer = &self.streamer;
        loop {
            let slot = match streamer.manager.get_frame(self.camera) {
                Some(slot) => slot,
                None => {
                    tracing::info!(
                        camera = self.camera,
                        parts = self.parts,
                        "MJPEG stream ended: no frame available"
                    );
                    return None;
                }
            };

            if slot.sequence == self.last_sequence {
                tokio::time::sleep(streamer.idle_poll).await;
                continue;
            }
            self.last_sequence = slot.sequence;

            match annotate_blocking(streamer.annotator, streamer.detector.clone(), slot.frame).await {
                Ok(annotated) => {
                    self.parts += 1;
                    return Some(multipart_part(&annotated.jpeg));
                }
                Err(e) => {
                    // 跳过本帧，流继续
                    tracing::warn!(camera = self.camera, "MJPEG frame skipped: {}", e);
                }
            }
        }
    }
}

/// 组装一个 multipart 分段
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(jpeg.len() + 64);
    part.put_slice(b"--");
    part.put_slice(BOUNDARY.as_bytes());
    part.put_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}
