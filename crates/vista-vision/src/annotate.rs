// 检测叠加绘制与 JPEG 编码
use crate::detector::Detector;
use crate::font::{self, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::{DemographicsSummary, Detection, Result, VisionError};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use vista_capture::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const STAFF_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([24, 24, 24]);
const BOX_THICKNESS: u32 = 2;
const LABEL_PADDING: u32 = 2;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// 检测结果与统计（不含图像）
#[derive(Debug, Clone)]
pub struct Analysis {
    pub detections: Vec<Detection>,
    pub demographics: DemographicsSummary,
}

/// 绘制并编码后的结果
#[derive(Debug, Clone)]
pub struct Annotated {
    pub jpeg: Bytes,
    pub detections: Vec<Detection>,
    pub demographics: DemographicsSummary,
}

/// 检测标注器
///
/// 只处理帧的私有拷贝，绘制不会影响帧槽中的数据。
#[derive(Debug, Clone, Copy)]
pub struct DetectionAnnotator {
    jpeg_quality: u8,
}

impl Default for DetectionAnnotator {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl DetectionAnnotator {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// 仅运行检测与统计
    pub fn analyze(&self, frame: &Frame, detector: &dyn Detector) -> Result<Analysis> {
        let detections = detector.detect(frame)?;
        let demographics = detector.summarize(&detections);
        Ok(Analysis {
            detections,
            demographics,
        })
    }

    /// 检测、绘制并编码
    pub fn annotate(&self, frame: &Frame, detector: &dyn Detector) -> Result<Annotated> {
        let Analysis {
            detections,
            demographics,
        } = self.analyze(frame, detector)?;
        let jpeg = self.render(frame, &detections)?;

        Ok(Annotated {
            jpeg,
            detections,
            demographics,
        })
    }

    /// 在帧上绘制给定检测结果并编码
    pub fn render(&self, frame: &Frame, detections: &[Detection]) -> Result<Bytes> {
        self.encode_image(&overlay(frame, detections)?)
    }

    /// 不加叠加直接编码
    pub fn encode(&self, frame: &Frame) -> Result<Bytes> {
        self.encode_image(&to_image(frame)?)
    }

    fn encode_image(&self, image: &RgbImage) -> Result<Bytes> {
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality)
            .encode_image(image)
            .map_err(|e| VisionError::Encode(e.to_string()))?;
        Ok(Bytes::from(buffer))
    }
}

fn to_image(frame: &Frame) -> Result<RgbImage> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(VisionError::InvalidFrame(format!(
            "cannot render a {}x{} frame",
            frame.width(),
            frame.height()
        )));
    }
    RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec()).ok_or_else(|| {
        VisionError::InvalidFrame(format!(
            "buffer does not match {}x{}",
            frame.width(),
            frame.height()
        ))
    })
}

fn overlay(frame: &Frame, detections: &[Detection]) -> Result<RgbImage> {
    let mut image = to_image(frame)?;
    for detection in detections {
        draw_detection(&mut image, detection);
    }
    Ok(image)
}

fn draw_detection(image: &mut RgbImage, detection: &Detection) {
    let color = if detection.is_staff {
        STAFF_COLOR
    } else {
        BOX_COLOR
    };
    let bbox = detection.bbox;
    let left = bbox.x as i64;
    let top = bbox.y as i64;
    let right = left + bbox.width as i64 - 1;
    let bottom = top + bbox.height as i64 - 1;

    for inset in 0..BOX_THICKNESS as i64 {
        draw_rectangle(image, left + inset, top + inset, right - inset, bottom - inset, color);
    }

    let label = format!(
        "{} {}",
        detection.gender.label().to_uppercase(),
        detection.age_range.label()
    );
    let strip_height = (GLYPH_HEIGHT + LABEL_PADDING * 2) as i64;
    // 标签放在框上方，放不下时贴在框内顶部
    let strip_top = if top >= strip_height { top - strip_height } else { top };
    let strip_right = left + (font::text_width(&label) + LABEL_PADDING * 2) as i64 - 1;

    fill_rect(image, left, strip_top, strip_right, strip_top + strip_height - 1, LABEL_BACKGROUND);
    draw_text(
        image,
        left + LABEL_PADDING as i64,
        strip_top + LABEL_PADDING as i64,
        &label,
        color,
    );
}

fn put_pixel(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(image: &mut RgbImage, left: i64, top: i64, right: i64, bottom: i64, color: Rgb<u8>) {
    if left > right || top > bottom {
        return;
    }
    // 只遍历画面内的部分，边线本身仍由 put_pixel 裁剪
    let max_x = image.width() as i64 - 1;
    let max_y = image.height() as i64 - 1;
    for x in left.max(0)..=right.min(max_x) {
        put_pixel(image, x, top, color);
        put_pixel(image, x, bottom, color);
    }
    for y in top.max(0)..=bottom.min(max_y) {
        put_pixel(image, left, y, color);
        put_pixel(image, right, y, color);
    }
}

fn fill_rect(image: &mut RgbImage, left: i64, top: i64, right: i64, bottom: i64, color: Rgb<u8>) {
    let right = right.min(image.width() as i64 - 1);
    let bottom = bottom.min(image.height() as i64 - 1);
    for y in top.max(0)..=bottom {
        for x in left.max(0)..=right {
            put_pixel(image, x, y, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>) {
    let mut cursor = x;
    for ch in text.chars() {
        if let Some(rows) = font::glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        put_pixel(image, cursor + col as i64, y + row as i64, color);
                    }
                }
            }
        }
        cursor += ADVANCE as i64;
    }
}
