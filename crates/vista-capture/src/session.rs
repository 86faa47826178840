// 单路摄像头采集会话
use crate::source::FrameSource;
use crate::{CaptureError, FrameStore, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// 会话运行状态快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub camera_index: u32,
    pub source: String,
    pub state: SessionState,
    pub frames_captured: u64,
    pub read_failures: u64,
    pub last_error: Option<String>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

/// 采集会话
///
/// 在独立任务中循环读帧并写入 FrameStore。读失败只记录并等待重试，
/// 只有停止信号能结束循环；设备句柄在任务退出时释放一次。
pub struct CaptureSession {
    camera: u32,
    source: Box<dyn FrameSource>,
    store: Arc<FrameStore>,
    status: Arc<Mutex<SessionStatus>>,
    stop_rx: watch::Receiver<bool>,
    retry_delay: Duration,
}

impl CaptureSession {
    /// 启动采集任务
    pub fn spawn(
        camera: u32,
        source: Box<dyn FrameSource>,
        store: Arc<FrameStore>,
        retry_delay: Duration,
    ) -> SessionHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let status = Arc::new(Mutex::new(SessionStatus {
            camera_index: camera,
            source: source.describe(),
            state: SessionState::Starting,
            frames_captured: 0,
            read_failures: 0,
            last_error: None,
            last_frame_at: None,
            started_at: Utc::now(),
        }));

        let session = CaptureSession {
            camera,
            source,
            store: store.clone(),
            status: status.clone(),
            stop_rx,
            retry_delay,
        };
        let task = tokio::spawn(session.run());

        SessionHandle {
            camera,
            store,
            status,
            stop_tx,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    async fn run(mut self) {
        // 任务以任何方式退出（正常、panic、abort）都会置为 Stopped
        let _exit = StoppedOnExit(self.status.clone());
        set_state(&self.status, SessionState::Running);
        tracing::info!(camera = self.camera, "Capture loop started: {}", self.source.describe());

        // 连续失败计数，用于日志降噪
        let mut failure_streak: u64 = 0;

        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            let result = tokio::select! {
                biased;
                _ = self.stop_rx.changed() => break,
                // 设备 panic 按一次读失败处理
                result = AssertUnwindSafe(self.source.read_frame()).catch_unwind() => {
                    result.unwrap_or_else(|panic| {
                        Err(CaptureError::Read(format!("source panicked: {}", panic_message(&*panic))))
                    })
                }
            };

            match result {
                Ok(frame) => {
                    let sequence = self.store.publish(frame);
                    if failure_streak > 0 {
                        tracing::info!(
                            camera = self.camera,
                            "Capture recovered after {} failed reads",
                            failure_streak
                        );
                        failure_streak = 0;
                    }
                    let mut status = lock(&self.status);
                    status.frames_captured = sequence;
                    status.last_frame_at = Some(Utc::now());
                }
                Err(e) => {
                    failure_streak += 1;
                    {
                        let mut status = lock(&self.status);
                        status.read_failures += 1;
                        status.last_error = Some(e.to_string());
                    }
                    if failure_streak == 1 {
                        tracing::warn!(camera = self.camera, "Frame read failed: {}", e);
                    } else {
                        tracing::debug!(camera = self.camera, streak = failure_streak, "Frame read failed: {}", e);
                    }

                    // 可被停止信号打断的退避等待
                    tokio::select! {
                        biased;
                        _ = self.stop_rx.changed() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        tracing::info!(camera = self.camera, "Capture loop exited, releasing {}", self.source.describe());
        // self.source 在此 drop，设备句柄随之释放
    }
}

struct StoppedOnExit(Arc<Mutex<SessionStatus>>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        set_state(&self.0, SessionState::Stopped);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 会话句柄（由 CameraManager 持有）
pub struct SessionHandle {
    camera: u32,
    store: Arc<FrameStore>,
    status: Arc<Mutex<SessionStatus>>,
    stop_tx: watch::Sender<bool>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    pub fn camera(&self) -> u32 {
        self.camera
    }

    pub fn store(&self) -> &Arc<FrameStore> {
        &self.store
    }

    pub fn status(&self) -> SessionStatus {
        lock(&self.status).clone()
    }

    pub fn state(&self) -> SessionState {
        lock(&self.status).state
    }

    /// 会话是否仍在采集（Starting/Running）
    pub fn is_running(&self) -> bool {
        matches!(self.state(), SessionState::Starting | SessionState::Running)
    }

    /// 发送停止信号并在超时内等待任务退出
    ///
    /// 超时后强制中止任务（仍会释放设备句柄）并返回 StopTimeout。重复调用无副作用。
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            return Ok(());
        };

        {
            let mut status = lock(&self.status);
            if status.state != SessionState::Stopped {
                status.state = SessionState::Stopping;
            }
        }
        let _ = self.stop_tx.send(true);

        let abort = handle.abort_handle();
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                // 任务 panic 时 source 已随栈展开释放
                tracing::error!(camera = self.camera, "Capture task failed: {}", e);
                set_state(&self.status, SessionState::Stopped);
                Ok(())
            }
            Err(_) => {
                abort.abort();
                set_state(&self.status, SessionState::Stopped);
                let err = CaptureError::StopTimeout {
                    camera: self.camera,
                    timeout,
                };
                tracing::error!(camera = self.camera, "{}; task aborted, operator attention required", err);
                Err(err)
            }
        }
    }
}

fn lock(status: &Mutex<SessionStatus>) -> MutexGuard<'_, SessionStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn set_state(status: &Mutex<SessionStatus>, state: SessionState) {
    lock(status).state = state;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    /// 按脚本返回成功/失败的测试设备
    struct ScriptedSource {
        fail_first: usize,
        reads: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn read_frame(&mut self) -> Result<Frame> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            if n < self.fail_first {
                return Err(CaptureError::Read("scripted failure".to_string()));
            }
            Frame::new(2, 2, vec![n as u8; 12])
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 永远不返回的读（模拟卡死的设备）
    struct HangingSource {
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FrameSource for HangingSource {
        async fn read_frame(&mut self) -> Result<Frame> {
            std::future::pending().await
        }

        fn describe(&self) -> String {
            "hanging".to_string()
        }
    }

    impl Drop for HangingSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    async fn wait_for_frame(store: &FrameStore) {
        for _ in 0..200 {
            if store.latest().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no frame captured");
    }

    #[tokio::test]
    async fn test_read_failures_are_retried() {
        let reads = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(FrameStore::new());
        let handle = CaptureSession::spawn(
            1,
            Box::new(ScriptedSource {
                fail_first: 3,
                reads: reads.clone(),
                released: released.clone(),
            }),
            store.clone(),
            Duration::from_millis(5),
        );

        wait_for_frame(&store).await;
        let status = handle.status();
        assert_eq!(status.read_failures, 3);
        assert_eq!(status.last_error.as_deref(), Some("Frame read failed: scripted failure"));
        assert!(handle.is_running());

        handle.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.state(), SessionState::Stopped);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_interrupts_pending_read() {
        let released = Arc::new(AtomicBool::new(false));
        let handle = CaptureSession::spawn(
            2,
            Box::new(HangingSource {
                released: released.clone(),
            }),
            Arc::new(FrameStore::new()),
            Duration::from_millis(5),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop(Duration::from_millis(500)).await.unwrap();

        assert!(released.load(Ordering::SeqCst));
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let released = Arc::new(AtomicUsize::new(0));
        let handle = CaptureSession::spawn(
            3,
            Box::new(ScriptedSource {
                fail_first: 0,
                reads: Arc::new(AtomicUsize::new(0)),
                released: released.clone(),
            }),
            Arc::new(FrameStore::new()),
            Duration::from_millis(5),
        );

        handle.stop(Duration::from_secs(1)).await.unwrap();
        handle.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    /// 阻塞线程、不响应停止信号的读
    struct StalledSource;

    #[async_trait]
    impl FrameSource for StalledSource {
        async fn read_frame(&mut self) -> Result<Frame> {
            std::thread::sleep(Duration::from_millis(500));
            Err(CaptureError::Read("stalled".to_string()))
        }

        fn describe(&self) -> String {
            "stalled".to_string()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_timeout_is_reported() {
        let handle = CaptureSession::spawn(
            4,
            Box::new(StalledSource),
            Arc::new(FrameStore::new()),
            Duration::from_millis(5),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = handle.stop(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::StopTimeout { camera: 4, timeout } if timeout == Duration::from_millis(50)
        ));
        assert_eq!(handle.state(), SessionState::Stopped);
        assert!(!handle.is_running());

        // 已中止的会话再次停止无副作用
        handle.stop(Duration::from_millis(50)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_interrupts_retry_delay() {
        let reads = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let handle = CaptureSession::spawn(
            5,
            Box::new(ScriptedSource {
                fail_first: usize::MAX,
                reads: reads.clone(),
                released: released.clone(),
            }),
            Arc::new(FrameStore::new()),
            Duration::from_secs(10),
        );

        for _ in 0..200 {
            if handle.status().read_failures >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handle.status().read_failures, 1);

        let started = Instant::now();
        handle.stop(Duration::from_secs(2)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    /// 前几次读 panic，之后正常出帧
    struct FlakySource {
        panics_left: usize,
    }

    #[async_trait]
    impl FrameSource for FlakySource {
        async fn read_frame(&mut self) -> Result<Frame> {
            if self.panics_left > 0 {
                self.panics_left -= 1;
                panic!("driver crashed");
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            Frame::new(1, 1, vec![9u8; 3])
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    #[tokio::test]
    async fn test_panicking_read_is_retried() {
        let store = Arc::new(FrameStore::new());
        let handle = CaptureSession::spawn(
            6,
            Box::new(FlakySource { panics_left: 2 }),
            store.clone(),
            Duration::from_millis(5),
        );

        wait_for_frame(&store).await;
        let status = handle.status();
        assert_eq!(status.read_failures, 2);
        assert_eq!(
            status.last_error.as_deref(),
            Some("Frame read failed: source panicked: driver crashed")
        );
        assert!(handle.is_running());

        handle.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.state(), SessionState::Stopped);
    }
}
