use crate::detector::Detector;
use crate::{Detection, Result};
use vista_capture::Frame;

/// 不做任何检测
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDetector;

impl Detector for NoopDetector {
    fn name(&self) -> &str {
        "none"
    }

    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}
