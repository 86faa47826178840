// 启动时按目录拉起摄像头
use crate::catalog::CameraStatus;
use crate::state::AppState;

/// 启动所有状态为 active 的摄像头；打开失败的记录标记为 error，服务继续运行
pub async fn bring_up_cameras(state: &AppState) -> usize {
    let mut started = 0;

    for record in state.catalog.list().await {
        if record.status != CameraStatus::Active {
            continue;
        }

        let opened = match record.source() {
            Ok(source) => state.manager.add_camera(record.camera_index, source).await,
            Err(e) => {
                tracing::warn!(camera = record.camera_index, "Invalid camera source: {}", e);
                false
            }
        };

        if opened {
            started += 1;
        } else {
            tracing::warn!(
                camera = record.camera_index,
                name = %record.name,
                "Camera failed to start, marking as error"
            );
            state.catalog.set_status(record.id, CameraStatus::Error).await;
        }
    }

    tracing::info!("Started {} cameras", started);
    started
}
