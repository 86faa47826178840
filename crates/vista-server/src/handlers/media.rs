use crate::distribution::{mjpeg, DetectReport};
use crate::error::{ApiError, Result};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

/// MJPEG 实时流
pub async fn stream_camera(
    State(state): State<AppState>,
    Path(camera_index): Path<u32>,
) -> Result<Response> {
    let stream = state.streamer.open(camera_index)?;

    Ok((
        [
            (header::CONTENT_TYPE, mjpeg::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// 单帧快照
pub async fn snapshot_camera(
    State(state): State<AppState>,
    Path(camera_index): Path<u32>,
) -> Result<Response> {
    let jpeg = state.snapshots.snapshot(camera_index).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

/// 当前帧检测
pub async fn detect_camera(
    State(state): State<AppState>,
    Path(camera_index): Path<u32>,
) -> Result<Json<DetectReport>> {
    Ok(Json(state.snapshots.detect(camera_index).await?))
}

/// 上传图片检测（multipart 字段 image）
pub async fn detect_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DetectReport>> {
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("image") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            image = Some(bytes);
            break;
        }
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("No image provided".to_string()))?;
    debug!(bytes = image.len(), "Running detection on uploaded image");

    let frame = vista_vision::decode_image(&image)?;
    Ok(Json(state.snapshots.detect_frame(frame).await?))
}
