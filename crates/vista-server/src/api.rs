use crate::{handlers, state::AppState, ws};
use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// 创建 API 路由
pub fn create_router(state: AppState) -> Router {
    // 同一层级的路径参数必须同名：删除按记录 id，其余按摄像头序号
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 摄像头管理 API
        .route(
            "/api/cameras",
            get(handlers::list_cameras).post(handlers::create_camera),
        )
        .route("/api/cameras/test", post(handlers::test_camera))
        .route("/api/cameras/active", get(handlers::active_cameras))
        .route("/api/cameras/:id", delete(handlers::delete_camera))
        .route("/api/cameras/:id/status", get(handlers::camera_status))
        // 媒体 API
        .route("/api/cameras/:id/stream", get(handlers::stream_camera))
        .route("/api/cameras/:id/snapshot", get(handlers::snapshot_camera))
        .route("/api/cameras/:id/detect", get(handlers::detect_camera))
        .route("/api/ai/detect", post(handlers::detect_upload))
        // 检测推送
        .route("/ws/camera/:id", get(ws::camera_feed))
        // 添加中间件
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 健康检查
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
