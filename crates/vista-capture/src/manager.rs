// 摄像头管理器：会话注册表与设备生命周期
use crate::session::{CaptureSession, SessionHandle, SessionStatus};
use crate::source::{CameraSource, SourceFactory};
use crate::{FrameSlot, FrameStore};
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// 摄像头序号（注册表键）
pub type CameraId = u32;

/// 采集参数
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// 读帧失败后的重试间隔
    pub retry_delay: Duration,
    /// 停止会话时等待任务退出的上限
    pub stop_timeout: Duration,
    /// 连通性探测（打开 + 读一帧）的上限
    pub connect_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// 摄像头管理器
///
/// 显式构造、显式关闭的服务对象，由 HTTP 层注入使用。每个序号同一时刻最多一个会话；
/// 同一序号的增删操作串行，不同序号互不阻塞。
pub struct CameraManager {
    factory: Arc<dyn SourceFactory>,
    config: CaptureConfig,
    sessions: DashMap<CameraId, Arc<SessionHandle>>,
    // 每个序号一把生命周期锁
    lifecycle: DashMap<CameraId, Arc<Mutex<()>>>,
}

impl CameraManager {
    pub fn new(factory: Arc<dyn SourceFactory>, config: CaptureConfig) -> Self {
        Self {
            factory,
            config,
            sessions: DashMap::new(),
            lifecycle: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn lifecycle_lock(&self, id: CameraId) -> Arc<Mutex<()>> {
        self.lifecycle
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 没有其他调用方持有时回收该序号的生命周期锁
    fn release_lifecycle_lock(&self, id: CameraId, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.lifecycle
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// 添加摄像头并启动采集
    ///
    /// 已有运行中的会话时直接返回 true；打开失败返回 false 且不留下注册项。
    pub async fn add_camera(&self, id: CameraId, source: CameraSource) -> bool {
        let lock = self.lifecycle_lock(id);
        let added = {
            let _guard = lock.lock().await;
            self.add_locked(id, source).await
        };
        self.release_lifecycle_lock(id, lock);
        added
    }

    async fn add_locked(&self, id: CameraId, source: CameraSource) -> bool {
        let existing = self.sessions.get(&id).map(|entry| entry.value().clone());
        if let Some(existing) = existing {
            if existing.is_running() {
                tracing::debug!(camera = id, "Camera already active");
                return true;
            }
            // 采集任务已异常退出，清理后重新打开
            tracing::warn!(camera = id, "Replacing stopped capture session");
            if let Err(e) = existing.stop(self.config.stop_timeout).await {
                tracing::warn!(camera = id, "Stale session did not stop cleanly: {}", e);
            }
            self.sessions.remove(&id);
        }

        tracing::info!(camera = id, "Opening camera source {}", source);
        let reader = match self.factory.open(&source).await {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(camera = id, "Failed to open camera: {}", e);
                return false;
            }
        };

        let store = Arc::new(FrameStore::new());
        let handle = CaptureSession::spawn(id, reader, store, self.config.retry_delay);
        self.sessions.insert(id, Arc::new(handle));

        tracing::info!(camera = id, "Camera added");
        true
    }

    /// 停止并移除摄像头
    ///
    /// 先等待采集任务退出（设备句柄已释放），再删除帧槽。
    pub async fn remove_camera(&self, id: CameraId) -> bool {
        let lock = self.lifecycle_lock(id);
        let removed = {
            let _guard = lock.lock().await;
            self.remove_locked(id).await
        };
        self.release_lifecycle_lock(id, lock);
        removed
    }

    async fn remove_locked(&self, id: CameraId) -> bool {
        let handle = match self.sessions.get(&id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };

        if let Err(e) = handle.stop(self.config.stop_timeout).await {
            // 已在 stop 内以 error 级别记录，这里仍然移除注册项
            tracing::warn!(camera = id, "Camera removed after forced stop: {}", e);
        }

        self.sessions.remove(&id);
        tracing::info!(camera = id, "Camera removed");
        true
    }

    /// 拷出最新帧
    pub fn get_frame(&self, id: CameraId) -> Option<FrameSlot> {
        let store = self.sessions.get(&id)?.store().clone();
        store.latest()
    }

    /// 当前帧序号，无会话时为 None
    pub fn frame_sequence(&self, id: CameraId) -> Option<u64> {
        self.sessions.get(&id).map(|entry| entry.store().sequence())
    }

    pub fn is_active(&self, id: CameraId) -> bool {
        self.sessions
            .get(&id)
            .map(|entry| entry.is_running())
            .unwrap_or(false)
    }

    pub fn list_active(&self) -> BTreeSet<CameraId> {
        self.sessions
            .iter()
            .filter(|entry| entry.is_running())
            .map(|entry| *entry.key())
            .collect()
    }

    /// 连通性探测：打开并读取一帧，不修改注册表
    pub async fn test_connection(&self, id: CameraId, source: &CameraSource) -> bool {
        let attempt = async {
            let mut reader = self.factory.open(source).await?;
            reader.read_frame().await
        };

        match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok(frame)) => {
                tracing::info!(
                    camera = id,
                    "Connection test succeeded: {} ({}x{})",
                    source,
                    frame.width(),
                    frame.height()
                );
                true
            }
            Ok(Err(e)) => {
                tracing::info!(camera = id, "Connection test failed: {}", e);
                false
            }
            Err(_) => {
                tracing::info!(
                    camera = id,
                    "Connection test timed out after {:?}",
                    self.config.connect_timeout
                );
                false
            }
        }
    }

    pub fn status(&self, id: CameraId) -> Option<SessionStatus> {
        self.sessions.get(&id).map(|entry| entry.status())
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        let mut statuses: Vec<_> = self.sessions.iter().map(|entry| entry.status()).collect();
        statuses.sort_by_key(|status| status.camera_index);
        statuses
    }

    /// 停止所有会话
    pub async fn shutdown(&self) {
        let ids: Vec<CameraId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        tracing::info!("Stopping {} capture sessions", ids.len());

        // 不同序号并行停止
        join_all(ids.into_iter().map(|id| self.remove_camera(id))).await;

        tracing::info!("Camera manager stopped");
    }
}
