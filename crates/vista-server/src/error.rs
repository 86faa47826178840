use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use vista_vision::VisionError;

/// API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 资源不存在 / 暂无帧
    NotFound(String),
    /// 请求错误
    BadRequest(String),
    /// 图像编码失败
    EncodeFailed(String),
    /// 内部错误
    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::EncodeFailed(msg) => write!(f, "Encode failed: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::EncodeFailed(msg) => {
                tracing::error!("Frame encoding failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode frame".to_string())
            }
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

// 从 vista_vision::VisionError 转换
impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Encode(msg) => ApiError::EncodeFailed(msg),
            VisionError::Decode(msg) => ApiError::BadRequest(format!("Invalid image: {}", msg)),
            VisionError::InvalidFrame(msg) => ApiError::InternalError(msg),
            VisionError::Detector(msg) => ApiError::InternalError(format!("Detection failed: {}", msg)),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
