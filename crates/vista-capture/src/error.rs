use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// 设备打开失败（不可达、无权限、首帧超时）
    #[error("Failed to open {uri}: {reason}")]
    Open { uri: String, reason: String },

    /// 单次读帧失败，由采集循环重试
    #[error("Frame read failed: {0}")]
    Read(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid frame: expected {expected} bytes for {width}x{height}, got {actual}")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Frame size {width}x{height} exceeds the {max}x{max} limit")]
    FrameTooLarge { width: u32, height: u32, max: u32 },

    /// 采集任务未在超时内退出，需要运维介入
    #[error("Capture session for camera {camera} did not stop within {timeout:?}")]
    StopTimeout { camera: u32, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub(crate) fn open(uri: impl ToString, reason: impl ToString) -> Self {
        CaptureError::Open {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
