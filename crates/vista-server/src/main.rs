use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use vista_capture::{CameraManager, DefaultSourceFactory};
use vista_server::{
    bootstrap, catalog::MemoryCatalog, create_router, logging, shutdown, AppConfig, AppState,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/vista.toml")]
    config: PathBuf,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // 初始化日志
    logging::init(&config.logging)?;
    tracing::info!("Starting vista server with config: {}", args.config.display());

    // 摄像头管理器（显式构造，退出前显式关闭）
    let factory = Arc::new(DefaultSourceFactory::new(config.ffmpeg_config()));
    let manager = Arc::new(CameraManager::new(factory, config.capture_config()));
    let catalog = Arc::new(MemoryCatalog::seeded(config.seed_cameras()));
    let detector = vista_vision::build_detector(&config.detector);

    let state = AppState::new(&config, manager.clone(), catalog, detector);
    bootstrap::bring_up_cameras(&state).await;

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    // 收到信号后先停采集，MJPEG 流随之结束，连接才能排空
    let stopping = manager.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown::shutdown_signal().await;
            stopping.shutdown().await;
        })
        .await;

    // 服务异常退出时同样释放设备
    manager.shutdown().await;
    served?;

    tracing::info!("Server stopped");
    Ok(())
}
