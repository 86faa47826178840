// 上传图片解码
use crate::{Result, VisionError};
use vista_capture::Frame;

/// 将 JPEG/PNG 字节解码为 RGB24 帧
pub fn decode_image(bytes: &[u8]) -> Result<Frame> {
    if bytes.is_empty() {
        return Err(VisionError::Decode("empty image".to_string()));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| VisionError::Decode(e.to_string()))?
        .to_rgb8();
    let (width, height) = image.dimensions();

    Frame::new(width, height, image.into_raw()).map_err(|e| VisionError::InvalidFrame(e.to_string()))
}
