use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    /// JPEG 编码失败
    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Detector error: {0}")]
    Detector(String),
}

pub type Result<T> = std::result::Result<T, VisionError>;
