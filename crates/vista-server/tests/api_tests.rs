use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use vista_capture::{CameraManager, DefaultSourceFactory, Frame};
use vista_server::{catalog::MemoryCatalog, config::AppConfig, create_router, AppState};
use vista_vision::{DetectionAnnotator, DetectorBackend};

const SYNTHETIC: &str = "synthetic://test?width=64&height=48&fps=60";

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    // 没有可用的 ffmpeg，设备/RTSP 源一律打开失败
    config.ffmpeg.binary = "/nonexistent/ffmpeg-for-vista-tests".to_string();
    config.ffmpeg.open_timeout_ms = 200;
    config.capture.connect_timeout_ms = 1000;
    config.capture.stop_timeout_ms = 1000;
    config.detector.backend = DetectorBackend::Random;
    config.detector.seed = Some(1);
    config.detector.max_people = 2;
    config
}

fn create_test_state() -> AppState {
    let config = test_config();
    let factory = Arc::new(DefaultSourceFactory::new(config.ffmpeg_config()));
    let manager = Arc::new(CameraManager::new(factory, config.capture_config()));
    let detector = vista_vision::build_detector(&config.detector);
    AppState::new(&config, manager, Arc::new(MemoryCatalog::new()), detector)
}

fn app(state: &AppState) -> Router {
    create_router(state.clone())
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, axum::body::Bytes) {
    let response = app(state).oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body)
}

async fn send_json(state: &AppState, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .method(method)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = send(state, request).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, axum::body::Bytes) {
    send(state, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn wait_for_frame(state: &AppState, index: u32) {
    for _ in 0..200 {
        if state.manager.get_frame(index).is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("camera {index} produced no frame");
}

async fn add_synthetic(state: &AppState, index: u32) -> Value {
    let (status, json) = send_json(
        state,
        "POST",
        "/api/cameras",
        json!({"name": "Test", "cameraIndex": index, "location": "Lab", "rtspUrl": SYNTHETIC}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = create_test_state();
    let (status, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_create_camera_requires_index() {
    let state = create_test_state();
    let (status, json) = send_json(&state, "POST", "/api/cameras", json!({"name": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Camera index is required");
}

#[tokio::test]
async fn test_create_list_and_duplicate() {
    let state = create_test_state();
    let created = add_synthetic(&state, 0).await;
    assert_eq!(created["cameraIndex"], 0);
    assert_eq!(created["status"], "active");
    assert_eq!(created["isActive"], true);
    assert_eq!(created["rtspUrl"], SYNTHETIC);

    let (status, json) = send_json(
        &state,
        "POST",
        "/api/cameras",
        json!({"cameraIndex": 0, "rtspUrl": SYNTHETIC}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Camera with this index already exists");

    let (status, body) = get(&state, "/api/cameras").await;
    assert_eq!(status, StatusCode::OK);
    let list: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["name"], "Test");

    let (_, body) = get(&state, "/api/cameras/active").await;
    let active: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(active["cameras"], json!([0]));

    state.manager.shutdown().await;
}

#[tokio::test]
async fn test_create_unreachable_camera_is_server_error() {
    let state = create_test_state();
    let (status, json) = send_json(
        &state,
        "POST",
        "/api/cameras",
        json!({"cameraIndex": 4, "rtspUrl": "rtsp://127.0.0.1:1/none"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Failed to connect to camera");
    assert!(state.manager.list_active().is_empty());

    let (_, body) = get(&state, "/api/cameras").await;
    let list: Value = serde_json::from_slice(&body).unwrap();
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_test_does_not_activate() {
    let state = create_test_state();

    let (status, json) = send_json(
        &state,
        "POST",
        "/api/cameras/test",
        json!({"cameraIndex": 2, "rtspUrl": SYNTHETIC}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["cameraIndex"], 2);

    let (_, json) = send_json(
        &state,
        "POST",
        "/api/cameras/test",
        json!({"cameraIndex": 3, "rtspUrl": "rtsp://127.0.0.1:1/none"}),
    )
    .await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Failed to connect to camera");

    assert!(state.manager.list_active().is_empty());
}

#[tokio::test]
async fn test_snapshot_detect_and_status() {
    let state = create_test_state();

    let (status, body) = get(&state, "/api/cameras/1/snapshot").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "No frame available");

    add_synthetic(&state, 1).await;
    wait_for_frame(&state, 1).await;

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/api/cameras/1/snapshot")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let jpeg = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&jpeg[..2], &[0xff, 0xd8]);

    let (status, body) = get(&state, "/api/cameras/1/detect").await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_slice(&body).unwrap();
    let count = report["count"].as_u64().unwrap();
    assert_eq!(report["detections"].as_array().unwrap().len() as u64, count);
    assert_eq!(report["demographics"]["total"].as_u64().unwrap(), count);
    assert!(report["alerts"].as_array().unwrap().is_empty());

    let (status, body) = get(&state, "/api/cameras/1/status").await;
    assert_eq!(status, StatusCode::OK);
    let session: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(session["cameraIndex"], 1);
    assert_eq!(session["state"], "running");

    state.manager.shutdown().await;
}

#[tokio::test]
async fn test_stream_emits_multipart_jpeg() {
    let state = create_test_state();

    let (status, _) = get(&state, "/api/cameras/5/stream").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    add_synthetic(&state, 5).await;
    wait_for_frame(&state, 5).await;

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/api/cameras/5/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut body = response.into_body().into_data_stream();
    let part = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let header_bytes = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    assert!(part.starts_with(header_bytes));
    assert_eq!(&part[header_bytes.len()..header_bytes.len() + 2], &[0xff, 0xd8]);
    assert!(part.ends_with(b"\r\n"));

    drop(body);
    state.manager.shutdown().await;
}

#[tokio::test]
async fn test_delete_camera() {
    let state = create_test_state();
    let created = add_synthetic(&state, 6).await;
    let id = created["id"].as_u64().unwrap();
    wait_for_frame(&state, 6).await;

    let (status, json) = send_json(&state, "DELETE", &format!("/api/cameras/{id}"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    assert!(state.manager.get_frame(6).is_none());
    let (status, _) = get(&state, "/api/cameras/6/snapshot").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&state, "DELETE", &format!("/api/cameras/{id}"), Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_detect_uploaded_image() {
    let state = create_test_state();
    let frame = Frame::new(32, 24, vec![90u8; Frame::byte_len(32, 24)]).unwrap();
    let jpeg = DetectionAnnotator::default().encode(&frame).unwrap();

    let boundary = "vista-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"image\"; filename=\"frame.jpg\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    body.extend_from_slice(&jpeg);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .uri("/api/ai/detect")
        .method("POST")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::OK);

    let report: Value = serde_json::from_slice(&body).unwrap();
    assert!(report["count"].is_u64());
    assert!(report["demographics"].is_object());
}

#[tokio::test]
async fn test_detect_upload_without_image() {
    let state = create_test_state();
    let boundary = "vista-test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nhello\r\n--{boundary}--\r\n"
    );

    let request = Request::builder()
        .uri("/api/ai/detect")
        .method("POST")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "No image provided");
}

#[tokio::test]
async fn test_websocket_feed_for_inactive_camera() {
    use tokio_tungstenite::tungstenite::Message;

    let state = create_test_state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/camera/9"))
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Text(text) = first else {
        panic!("expected a text frame, got {first:?}");
    };
    let status: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        status,
        json!({"type": "status", "message": "Camera 9 not available", "cameraIndex": 9})
    );

    // 状态消息之后服务端直接关闭，不再推送
    let next = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap();
    assert!(
        matches!(next, Some(Ok(Message::Close(_))) | None),
        "unexpected frame after status: {next:?}"
    );

    server.abort();
}

#[tokio::test]
async fn test_create_oversized_synthetic_camera_is_rejected() {
    let state = create_test_state();
    let (status, json) = send_json(
        &state,
        "POST",
        "/api/cameras",
        json!({"cameraIndex": 8, "rtspUrl": "synthetic://x?width=4294967295&height=4294967295"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Failed to connect to camera");
    assert!(!state.manager.is_active(8));
    assert!(state.manager.list_active().is_empty());
}
