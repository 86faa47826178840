use crate::catalog::{CameraRecord, CameraStatus, NewCamera};
use crate::error::{ApiError, Result};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use vista_capture::{CameraSource, SessionStatus};

/// 摄像头记录 + 运行状态
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraView {
    #[serde(flatten)]
    pub record: CameraRecord,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCameraRequest {
    pub name: Option<String>,
    pub camera_index: Option<u32>,
    pub location: Option<String>,
    pub rtsp_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCameraRequest {
    pub camera_index: Option<u32>,
    pub rtsp_url: Option<String>,
}

fn resolve_source(camera_index: u32, rtsp_url: Option<&str>) -> Result<CameraSource> {
    CameraSource::resolve(camera_index, rtsp_url).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn view(state: &AppState, record: CameraRecord) -> CameraView {
    CameraView {
        is_active: state.manager.is_active(record.camera_index),
        record,
    }
}

/// 列出摄像头
pub async fn list_cameras(State(state): State<AppState>) -> Json<Vec<CameraView>> {
    debug!("Listing cameras");
    let records = state.catalog.list().await;
    Json(records.into_iter().map(|record| view(&state, record)).collect())
}

/// 添加摄像头并启动采集
pub async fn create_camera(
    State(state): State<AppState>,
    Json(req): Json<CreateCameraRequest>,
) -> Result<(StatusCode, Json<CameraView>)> {
    let camera_index = req
        .camera_index
        .ok_or_else(|| ApiError::BadRequest("Camera index is required".to_string()))?;

    if state.catalog.find_by_index(camera_index).await.is_some() {
        return Err(ApiError::BadRequest(
            "Camera with this index already exists".to_string(),
        ));
    }

    let rtsp_url = req.rtsp_url.filter(|url| !url.trim().is_empty());
    let source = resolve_source(camera_index, rtsp_url.as_deref())?;
    info!(camera = camera_index, source = %source, "Adding camera");

    if !state.manager.add_camera(camera_index, source).await {
        return Err(ApiError::InternalError(
            "Failed to connect to camera".to_string(),
        ));
    }

    let record = state
        .catalog
        .insert(NewCamera {
            name: req
                .name
                .unwrap_or_else(|| format!("Camera {}", camera_index)),
            camera_index,
            location: req.location,
            rtsp_url,
            status: CameraStatus::Active,
        })
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(view(&state, record))))
}

/// 删除摄像头（按记录 id）
pub async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>> {
    let record = state
        .catalog
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound("Camera not found".to_string()))?;

    // 先停采集，再删记录
    state.manager.remove_camera(record.camera_index).await;
    state.catalog.delete(id).await;
    info!(camera = record.camera_index, id, "Camera deleted");

    Ok(Json(json!({ "success": true })))
}

/// 连通性测试（不改变活跃集合）
pub async fn test_camera(
    State(state): State<AppState>,
    Json(req): Json<TestCameraRequest>,
) -> Result<Json<Value>> {
    let camera_index = req
        .camera_index
        .ok_or_else(|| ApiError::BadRequest("Camera index is required".to_string()))?;
    let rtsp_url = req.rtsp_url.filter(|url| !url.trim().is_empty());

    let success = match CameraSource::resolve(camera_index, rtsp_url.as_deref()) {
        Ok(source) => state.manager.test_connection(camera_index, &source).await,
        Err(e) => {
            warn!(camera = camera_index, "Connection test rejected: {}", e);
            false
        }
    };

    let message = if success {
        "Camera connection successful"
    } else {
        "Failed to connect to camera"
    };

    Ok(Json(json!({
        "success": success,
        "cameraIndex": camera_index,
        "message": message,
    })))
}

/// 活跃摄像头序号
pub async fn active_cameras(State(state): State<AppState>) -> Json<Value> {
    let cameras: Vec<u32> = state.manager.list_active().into_iter().collect();
    Json(json!({ "cameras": cameras }))
}

/// 采集会话运行状态
pub async fn camera_status(
    State(state): State<AppState>,
    Path(camera_index): Path<u32>,
) -> Result<Json<SessionStatus>> {
    state
        .manager
        .status(camera_index)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Camera not active".to_string()))
}
