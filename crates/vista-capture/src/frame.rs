// 帧与最新帧槽
use crate::{CaptureError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

/// 解码后的一帧（RGB24，紧密排列）
///
/// 数据不可变且引用计数，克隆不复制像素。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Bytes,
}

impl Frame {
    pub const BYTES_PER_PIXEL: usize = 3;
    /// 单边最大像素数
    pub const MAX_DIMENSION: u32 = 8192;

    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self> {
        let expected = Self::checked_byte_len(width, height)?;
        let data = data.into();
        if data.len() != expected {
            return Err(CaptureError::InvalidFrame {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// 给定尺寸下一帧的字节数（超出上限时饱和，不会 panic）
    pub fn byte_len(width: u32, height: u32) -> usize {
        (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(Self::BYTES_PER_PIXEL)
    }

    /// 校验尺寸并返回一帧的字节数
    pub fn checked_byte_len(width: u32, height: u32) -> Result<usize> {
        let too_large = || CaptureError::FrameTooLarge {
            width,
            height,
            max: Self::MAX_DIMENSION,
        };
        if width > Self::MAX_DIMENSION || height > Self::MAX_DIMENSION {
            return Err(too_large());
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(Self::BYTES_PER_PIXEL))
            .ok_or_else(too_large)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// 某一时刻的最新帧及其序号
#[derive(Debug, Clone)]
pub struct FrameSlot {
    pub frame: Frame,
    /// 会话存活期间单调递增，从 1 开始
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

/// 单路摄像头的最新帧存储
///
/// 写者无条件覆盖，不保留历史。锁内只做拷入/拷出。
#[derive(Debug, Default)]
pub struct FrameStore {
    slot: Mutex<Option<FrameSlot>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入新帧，返回分配的序号
    pub fn publish(&self, frame: Frame) -> u64 {
        let captured_at = Utc::now();
        let mut slot = self.lock();
        let sequence = slot.as_ref().map_or(1, |current| current.sequence + 1);
        *slot = Some(FrameSlot {
            frame,
            sequence,
            captured_at,
        });
        sequence
    }

    /// 拷出当前帧；尚未采到帧时返回 None
    pub fn latest(&self) -> Option<FrameSlot> {
        self.lock().clone()
    }

    /// 当前序号，空槽为 0
    pub fn sequence(&self) -> u64 {
        self.lock().as_ref().map_or(0, |slot| slot.sequence)
    }

    fn lock(&self) -> MutexGuard<'_, Option<FrameSlot>> {
        // 临界区内不会 panic，中毒时直接取回数据
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
