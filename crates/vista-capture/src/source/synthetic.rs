// 测试图案源（无需硬件）
use crate::source::FrameSource;
use crate::{CaptureError, Frame, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use url::Url;

/// 按固定帧率生成滚动渐变图案
///
/// 地址形如 `synthetic://lobby?width=320&height=240&fps=15`。
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    fps: u32,
    // 首次读帧时创建，构造不依赖运行时
    ticker: Option<Interval>,
    counter: u64,
}

impl SyntheticSource {
    pub const SCHEME: &'static str = "synthetic";

    pub fn new(name: impl Into<String>, width: u32, height: u32, fps: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidSource(format!(
                "synthetic size must be non-zero, got {}x{}",
                width, height
            )));
        }
        Frame::checked_byte_len(width, height)
            .map_err(|e| CaptureError::InvalidSource(format!("synthetic pattern: {}", e)))?;
        Ok(Self {
            name: name.into(),
            width,
            height,
            fps: fps.clamp(1, 120),
            ticker: None,
            counter: 0,
        })
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        let mut width = 320;
        let mut height = 240;
        let mut fps = 15;

        for (key, value) in url.query_pairs() {
            let parsed = value.parse::<u32>().map_err(|_| {
                CaptureError::InvalidSource(format!("{}: bad value for {}", url, key))
            })?;
            match key.as_ref() {
                "width" => width = parsed,
                "height" => height = parsed,
                "fps" => fps = parsed,
                _ => {}
            }
        }

        let name = url.host_str().unwrap_or("pattern").to_string();
        Self::new(name, width, height, fps)
    }

    fn render(&self) -> Vec<u8> {
        let shift = (self.counter * 4) as u32;
        let mut data = Vec::with_capacity(Frame::byte_len(self.width, self.height));
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift / 2) % 256) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        data
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn read_frame(&mut self) -> Result<Frame> {
        let period = Duration::from_micros(1_000_000 / self.fps as u64);
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        ticker.tick().await;
        let frame = Frame::new(self.width, self.height, self.render())?;
        self.counter = self.counter.wrapping_add(1);
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!(
            "synthetic:{} {}x{}@{}fps",
            self.name, self.width, self.height, self.fps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_change_over_time() {
        let mut source = SyntheticSource::new("t", 8, 4, 120).unwrap();
        let first = source.read_frame().await.unwrap();
        let second = source.read_frame().await.unwrap();
        assert_eq!(first.width(), 8);
        assert_ne!(first.data(), second.data());
    }

    #[test]
    fn test_from_url_parses_query() {
        let url = Url::parse("synthetic://dock?width=64&height=48&fps=5").unwrap();
        let source = SyntheticSource::from_url(&url).unwrap();
        assert_eq!((source.width, source.height, source.fps), (64, 48, 5));
        assert_eq!(source.describe(), "synthetic:dock 64x48@5fps");
    }

    #[test]
    fn test_rejects_zero_size() {
        let url = Url::parse("synthetic://x?width=0").unwrap();
        assert!(SyntheticSource::from_url(&url).is_err());
    }

    #[test]
    fn test_rejects_oversized_pattern() {
        for query in [
            "width=4294967295&height=4294967295",
            "width=200000&height=200000",
            "width=8193&height=2",
        ] {
            let url = Url::parse(&format!("synthetic://x?{query}")).unwrap();
            assert!(
                matches!(SyntheticSource::from_url(&url), Err(CaptureError::InvalidSource(_))),
                "{query} accepted"
            );
        }
    }
}
