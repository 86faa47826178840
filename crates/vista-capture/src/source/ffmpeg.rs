// 基于 ffmpeg 子进程的设备/网络流采集
use crate::source::{CameraSource, FrameSource};
use crate::{CaptureError, Frame, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// ffmpeg 采集配置
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// ffmpeg 可执行文件
    pub binary: String,
    /// 输出宽度（缩放后）
    pub width: u32,
    /// 输出高度（缩放后）
    pub height: u32,
    /// 限制输出帧率，None 表示跟随源
    pub fps: Option<u32>,
    /// RTSP 传输方式（tcp/udp）
    pub rtsp_transport: String,
    /// 打开设备时等待首帧的最长时间
    pub open_timeout: Duration,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            width: 640,
            height: 480,
            fps: None,
            rtsp_transport: "tcp".to_string(),
            open_timeout: Duration::from_secs(5),
        }
    }
}

/// ffmpeg 原始帧读取器
///
/// 子进程以 kill_on_drop 启动，读取器被丢弃时进程随之结束。
pub struct FfmpegSource {
    source: CameraSource,
    config: FfmpegConfig,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    /// 打开时探测到的首帧
    pending: Option<Frame>,
    restarts: u32,
}

impl FfmpegSource {
    /// 启动子进程并等待首帧
    pub async fn open(source: CameraSource, config: FfmpegConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::InvalidSource(format!(
                "ffmpeg output size must be non-zero, got {}x{}",
                config.width, config.height
            )));
        }
        Frame::checked_byte_len(config.width, config.height)
            .map_err(|e| CaptureError::InvalidSource(format!("ffmpeg output: {}", e)))?;

        let mut reader = Self {
            source,
            config,
            child: None,
            stdout: None,
            pending: None,
            restarts: 0,
        };

        reader
            .spawn()
            .map_err(|e| CaptureError::open(&reader.source, e))?;

        let open_timeout = reader.config.open_timeout;
        match tokio::time::timeout(open_timeout, reader.read_raw()).await {
            Ok(Ok(frame)) => {
                reader.pending = Some(frame);
                tracing::info!("ffmpeg source opened: {}", reader.source);
                Ok(reader)
            }
            Ok(Err(e)) => {
                reader.kill();
                Err(CaptureError::open(&reader.source, e))
            }
            Err(_) => {
                reader.kill();
                Err(CaptureError::open(
                    &reader.source,
                    format!("no frame within {:?}", open_timeout),
                ))
            }
        }
    }

    fn spawn(&mut self) -> Result<()> {
        let mut cmd = self.command()?;
        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Read("failed to capture ffmpeg stdout".to_string()))?;

        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    fn command(&self) -> Result<Command> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-nostdin");

        match &self.source {
            CameraSource::Device(index) => {
                Self::device_input(&mut cmd, *index)?;
            }
            CameraSource::Url(url) => {
                if url.scheme() == "rtsp" || url.scheme() == "rtsps" {
                    cmd.arg("-rtsp_transport").arg(&self.config.rtsp_transport);
                }
                cmd.arg("-fflags")
                    .arg("nobuffer")
                    .arg("-flags")
                    .arg("low_delay")
                    .arg("-i")
                    .arg(url.as_str());
            }
        }

        let mut filter = format!("scale={}:{}", self.config.width, self.config.height);
        if let Some(fps) = self.config.fps {
            filter = format!("fps={},{}", fps, filter);
        }

        cmd.arg("-an")
            .arg("-vf")
            .arg(filter)
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        Ok(cmd)
    }

    #[cfg(target_os = "linux")]
    fn device_input(cmd: &mut Command, index: u32) -> Result<()> {
        cmd.arg("-f")
            .arg("video4linux2")
            .arg("-i")
            .arg(format!("/dev/video{}", index));
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn device_input(cmd: &mut Command, index: u32) -> Result<()> {
        cmd.arg("-f")
            .arg("avfoundation")
            .arg("-framerate")
            .arg("30")
            .arg("-i")
            .arg(index.to_string());
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn device_input(_cmd: &mut Command, index: u32) -> Result<()> {
        Err(CaptureError::InvalidSource(format!(
            "local device {} is not supported on this platform; use a URL source",
            index
        )))
    }

    async fn read_raw(&mut self) -> Result<Frame> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| CaptureError::Read("ffmpeg process not running".to_string()))?;

        let mut buffer = vec![0u8; Frame::byte_len(self.config.width, self.config.height)];
        stdout
            .read_exact(&mut buffer)
            .await
            .map_err(|e| CaptureError::Read(format!("ffmpeg stream ended: {}", e)))?;

        Frame::new(self.config.width, self.config.height, buffer)
    }

    fn kill(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    async fn read_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }

        // 上次读失败后进程已结束，本次重新拉起
        if self.child.is_none() {
            self.restarts += 1;
            tracing::info!(
                "Restarting ffmpeg for {} (restart #{})",
                self.source,
                self.restarts
            );
            self.spawn()
                .map_err(|e| CaptureError::Read(format!("respawn failed: {}", e)))?;
        }

        match self.read_raw().await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.kill();
                Err(e)
            }
        }
    }

    fn describe(&self) -> String {
        format!(
            "ffmpeg:{} {}x{}",
            self.source, self.config.width, self.config.height
        )
    }
}
