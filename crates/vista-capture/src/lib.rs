// vista-capture: 多路摄像头采集核心库
//
// 架构设计：
// - 每路摄像头一个独立采集任务，只保留最新一帧
// - 读者只做拷贝，锁内不做任何 I/O 或图像处理
// - 设备句柄由采集任务独占，任务退出时释放

pub mod error;
pub mod frame;
pub mod manager;
pub mod session;
pub mod source;

// 重新导出常用类型
pub use error::{CaptureError, Result};
pub use frame::{Frame, FrameSlot, FrameStore};
pub use manager::{CameraId, CameraManager, CaptureConfig};
pub use session::{CaptureSession, SessionHandle, SessionState, SessionStatus};
pub use source::{
    CameraSource, DefaultSourceFactory, FfmpegConfig, FfmpegSource, FrameSource, SourceFactory,
    SyntheticSource,
};
