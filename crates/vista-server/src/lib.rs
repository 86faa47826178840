// vista-server: 摄像头 HTTP / WebSocket 服务

pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod distribution;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod shutdown;
pub mod state;
pub mod ws;

pub use api::create_router;
pub use config::AppConfig;
pub use error::{ApiError, Result};
pub use state::AppState;
