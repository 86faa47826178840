// WebSocket 检测推送
use crate::distribution::{DetectionFeed, FeedMessage, FeedSink, SinkClosed};
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};

/// GET /ws/camera/:id
pub async fn camera_feed(
    ws: WebSocketUpgrade,
    Path(camera_index): Path<u32>,
    State(state): State<AppState>,
) -> Response {
    let feed = state.feed.clone();
    ws.on_upgrade(move |socket| serve_feed(socket, camera_index, feed))
}

struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FeedSink for WsSink {
    async fn send(&mut self, message: FeedMessage) -> Result<(), SinkClosed> {
        let text = serde_json::to_string(&message).map_err(|e| SinkClosed(e.to_string()))?;
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|e| SinkClosed(e.to_string()))
    }
}

/// 推送任务与读取任务并行，任一结束即关闭连接
async fn serve_feed(socket: WebSocket, camera_index: u32, feed: DetectionFeed) {
    let (sender, mut receiver) = socket.split();
    tracing::info!(camera = camera_index, "WebSocket client connected");

    let mut feed_task = tokio::spawn(async move {
        let mut sink = WsSink { sender };
        let end = feed.run(camera_index, &mut sink).await;
        let _ = sink.sender.close().await;
        end
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(camera = camera_index, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        result = &mut feed_task => {
            recv_task.abort();
            match result {
                Ok(end) => tracing::debug!(camera = camera_index, reason = ?end, "Feed finished"),
                Err(e) => tracing::error!(camera = camera_index, "Feed task failed: {}", e),
            }
        }
        _ = &mut recv_task => {
            feed_task.abort();
        }
    }

    tracing::info!(camera = camera_index, "WebSocket client disconnected");
}
