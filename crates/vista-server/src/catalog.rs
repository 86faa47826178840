// 摄像头目录（持久化协作方）
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;
use vista_capture::CameraSource;

/// 摄像头记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Active,
    Inactive,
    Error,
}

/// 摄像头记录
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraRecord {
    pub id: u64,
    pub name: String,
    pub camera_index: u32,
    pub location: Option<String>,
    pub rtsp_url: Option<String>,
    pub status: CameraStatus,
    pub created_at: DateTime<Utc>,
}

impl CameraRecord {
    pub fn source(&self) -> vista_capture::Result<CameraSource> {
        CameraSource::resolve(self.camera_index, self.rtsp_url.as_deref())
    }
}

/// 新建摄像头请求
#[derive(Debug, Clone)]
pub struct NewCamera {
    pub name: String,
    pub camera_index: u32,
    pub location: Option<String>,
    pub rtsp_url: Option<String>,
    pub status: CameraStatus,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Camera with this index already exists")]
    DuplicateIndex(u32),
}

/// 摄像头目录接口
#[async_trait]
pub trait CameraCatalog: Send + Sync {
    async fn list(&self) -> Vec<CameraRecord>;

    async fn get(&self, id: u64) -> Option<CameraRecord>;

    async fn find_by_index(&self, camera_index: u32) -> Option<CameraRecord>;

    async fn insert(&self, camera: NewCamera) -> Result<CameraRecord, CatalogError>;

    async fn delete(&self, id: u64) -> Option<CameraRecord>;

    async fn set_status(&self, id: u64, status: CameraStatus) -> Option<CameraRecord>;
}

/// 内存目录
#[derive(Default)]
pub struct MemoryCatalog {
    inner: RwLock<CatalogInner>,
}

#[derive(Default)]
struct CatalogInner {
    records: BTreeMap<u64, CameraRecord>,
    next_id: u64,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以配置中的摄像头初始化，重复序号只保留第一条
    pub fn seeded(cameras: Vec<NewCamera>) -> Self {
        let mut inner = CatalogInner::default();
        for camera in cameras {
            let index = camera.camera_index;
            if let Err(e) = inner.insert(camera) {
                tracing::warn!(camera = index, "Skipping configured camera: {}", e);
            }
        }
        Self {
            inner: RwLock::new(inner),
        }
    }
}

impl CatalogInner {
    fn insert(&mut self, camera: NewCamera) -> Result<CameraRecord, CatalogError> {
        if self
            .records
            .values()
            .any(|record| record.camera_index == camera.camera_index)
        {
            return Err(CatalogError::DuplicateIndex(camera.camera_index));
        }

        self.next_id += 1;
        let record = CameraRecord {
            id: self.next_id,
            name: camera.name,
            camera_index: camera.camera_index,
            location: camera.location,
            rtsp_url: camera.rtsp_url,
            status: camera.status,
            created_at: Utc::now(),
        };
        self.records.insert(record.id, record.clone());
        Ok(record)
    }
}

#[async_trait]
impl CameraCatalog for MemoryCatalog {
    async fn list(&self) -> Vec<CameraRecord> {
        self.inner.read().await.records.values().cloned().collect()
    }

    async fn get(&self, id: u64) -> Option<CameraRecord> {
        self.inner.read().await.records.get(&id).cloned()
    }

    async fn find_by_index(&self, camera_index: u32) -> Option<CameraRecord> {
        self.inner
            .read()
            .await
            .records
            .values()
            .find(|record| record.camera_index == camera_index)
            .cloned()
    }

    async fn insert(&self, camera: NewCamera) -> Result<CameraRecord, CatalogError> {
        self.inner.write().await.insert(camera)
    }

    async fn delete(&self, id: u64) -> Option<CameraRecord> {
        self.inner.write().await.records.remove(&id)
    }

    async fn set_status(&self, id: u64, status: CameraStatus) -> Option<CameraRecord> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(&id)?;
        record.status = status;
        Some(record.clone())
    }
}
