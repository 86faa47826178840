use crate::catalog::{CameraStatus, NewCamera};
use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use vista_capture::{CaptureConfig, FfmpegConfig, Frame};
use vista_vision::DetectorSettings;

/// 服务配置（TOML 文件 + VISTA__ 前缀环境变量）
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub ffmpeg: FfmpegSettings,
    #[serde(default)]
    pub detector: DetectorSettings,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 启动时写入目录的摄像头
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureSettings {
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FfmpegSettings {
    #[serde(default = "default_ffmpeg_binary")]
    pub binary: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default = "default_rtsp_transport")]
    pub rtsp_transport: String,
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamSettings {
    /// JPEG 质量（1-100）
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// 无新帧时的轮询间隔
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

/// 检测推送模式
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedModeKind {
    /// 心跳 + 跳帧（默认）
    Keepalive,
    /// 固定间隔轮询
    Fixed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedSettings {
    #[serde(default = "default_feed_mode")]
    pub mode: FeedModeKind,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 每 N 次取到帧处理一次
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,
    /// 连续取帧失败多少次后发送等待提示
    #[serde(default = "default_keepalive_after")]
    pub keepalive_after: u32,
    #[serde(default = "default_fixed_interval_ms")]
    pub fixed_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertSettings {
    #[serde(default = "default_overcrowding_threshold")]
    pub overcrowding_threshold: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

/// 配置文件中的摄像头条目
#[derive(Debug, Deserialize, Clone)]
pub struct CameraEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub index: u32,
    #[serde(default)]
    pub location: Option<String>,
    /// 设备序号或地址（rtsp://、synthetic:// 等），为空时使用 index 对应的本地设备
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_camera_status")]
    pub status: CameraStatus,
}

// 默认值函数
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_rtsp_transport() -> String {
    "tcp".to_string()
}

fn default_open_timeout_ms() -> u64 {
    5000
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_idle_poll_ms() -> u64 {
    10
}

fn default_feed_mode() -> FeedModeKind {
    FeedModeKind::Keepalive
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_frame_skip() -> u32 {
    5
}

fn default_keepalive_after() -> u32 {
    30
}

fn default_fixed_interval_ms() -> u64 {
    1000
}

fn default_overcrowding_threshold() -> usize {
    vista_vision::DEFAULT_OVERCROWDING_THRESHOLD
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_camera_status() -> CameraStatus {
    CameraStatus::Active
}

// Default trait 实现
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            binary: default_ffmpeg_binary(),
            width: default_width(),
            height: default_height(),
            fps: None,
            rtsp_transport: default_rtsp_transport(),
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            mode: default_feed_mode(),
            poll_interval_ms: default_poll_interval_ms(),
            frame_skip: default_frame_skip(),
            keepalive_after: default_keepalive_after(),
            fixed_interval_ms: default_fixed_interval_ms(),
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            overcrowding_threshold: default_overcrowding_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// 加载配置：文件不存在时使用默认值，环境变量覆盖文件
    pub fn load(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Invalid config path: {}", path.display()))?;

        let config = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("VISTA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!(
                "stream.jpeg_quality must be within 1..=100, got {}",
                self.stream.jpeg_quality
            ));
        }

        if self.feed.frame_skip == 0 {
            return Err(anyhow!("feed.frame_skip must be greater than 0"));
        }

        if self.feed.poll_interval_ms == 0 || self.feed.fixed_interval_ms == 0 {
            return Err(anyhow!("feed intervals must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.detector.staff_ratio) {
            return Err(anyhow!(
                "detector.staff_ratio must be within 0.0..=1.0, got {}",
                self.detector.staff_ratio
            ));
        }

        if self.ffmpeg.width == 0 || self.ffmpeg.height == 0 {
            return Err(anyhow!("ffmpeg output size must be non-zero"));
        }

        Frame::checked_byte_len(self.ffmpeg.width, self.ffmpeg.height)
            .map_err(|e| anyhow!("ffmpeg output size: {}", e))?;

        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            retry_delay: Duration::from_millis(self.capture.retry_delay_ms),
            stop_timeout: Duration::from_millis(self.capture.stop_timeout_ms),
            connect_timeout: Duration::from_millis(self.capture.connect_timeout_ms),
        }
    }

    pub fn ffmpeg_config(&self) -> FfmpegConfig {
        FfmpegConfig {
            binary: self.ffmpeg.binary.clone(),
            width: self.ffmpeg.width,
            height: self.ffmpeg.height,
            fps: self.ffmpeg.fps,
            rtsp_transport: self.ffmpeg.rtsp_transport.clone(),
            open_timeout: Duration::from_millis(self.ffmpeg.open_timeout_ms),
        }
    }

    /// 配置中的摄像头转换为目录记录
    pub fn seed_cameras(&self) -> Vec<NewCamera> {
        self.cameras
            .iter()
            .map(|entry| NewCamera {
                name: entry
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Camera {}", entry.index)),
                camera_index: entry.index,
                location: entry.location.clone(),
                rtsp_url: entry.source.clone(),
                status: entry.status,
            })
            .collect()
    }
}
