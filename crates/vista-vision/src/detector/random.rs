// 随机占位检测器：位置和人口属性均为随机值，仅用于演示与联调
use crate::detector::Detector;
use crate::{AgeRange, BoundingBox, Detection, Gender, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use vista_capture::Frame;

const CONFIDENCE: f32 = 0.85;

pub struct RandomDetector {
    max_people: usize,
    staff_ratio: f64,
    rng: Mutex<StdRng>,
}

impl RandomDetector {
    pub fn new(max_people: usize, seed: Option<u64>, staff_ratio: f64) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            max_people,
            staff_ratio: staff_ratio.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }
}

impl Detector for RandomDetector {
    fn name(&self) -> &str {
        "random"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let (width, height) = (frame.width(), frame.height());
        if width < 2 || height < 2 {
            return Ok(Vec::new());
        }

        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = rng.gen_range(0..=self.max_people);

        let detections = (0..count)
            .map(|idx| {
                let box_w = rng.gen_range(1..=(width / 4).max(1));
                let box_h = rng.gen_range(1..=(height / 3).max(1));
                let x = rng.gen_range(0..=width - box_w);
                let y = rng.gen_range(0..=height - box_h);

                Detection {
                    tracking_id: format!("person_{}", idx),
                    bbox: BoundingBox {
                        x,
                        y,
                        width: box_w,
                        height: box_h,
                    },
                    confidence: CONFIDENCE,
                    gender: *Gender::ALL.choose(&mut *rng).unwrap_or(&Gender::Male),
                    age_range: *AgeRange::ALL
                        .choose(&mut *rng)
                        .unwrap_or(&AgeRange::YoungAdult),
                    is_staff: rng.gen_bool(self.staff_ratio),
                }
            })
            .collect();

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(width, height, vec![0u8; Frame::byte_len(width, height)]).unwrap()
    }

    #[test]
    fn test_boxes_stay_inside_frame() {
        let detector = RandomDetector::new(8, Some(7), 0.5);
        let frame = frame(64, 48);
        for _ in 0..50 {
            for detection in detector.detect(&frame).unwrap() {
                assert!(detection.bbox.x + detection.bbox.width <= 64);
                assert!(detection.bbox.y + detection.bbox.height <= 48);
                assert_eq!(detection.confidence, CONFIDENCE);
            }
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = RandomDetector::new(5, Some(42), 0.0);
        let b = RandomDetector::new(5, Some(42), 0.0);
        let frame = frame(32, 32);
        assert_eq!(a.detect(&frame).unwrap(), b.detect(&frame).unwrap());
    }

    #[test]
    fn test_tiny_frame_yields_nothing() {
        let detector = RandomDetector::new(5, Some(1), 0.0);
        assert!(detector.detect(&frame(1, 1)).unwrap().is_empty());
    }
}
