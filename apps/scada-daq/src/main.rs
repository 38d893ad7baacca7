//! 数据采集进程：装配采集引擎并提供状态接口。

mod acquisition;
mod handlers;
mod middleware;
mod routes;

use acquisition::{Engine, open_stores};
use scada_config::AppConfig;
use scada_scheduler::TagStatusBoard;
use scada_telemetry::{TelemetryMetrics, init_tracing, shared_metrics};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub board: TagStatusBoard,
    pub metrics: Arc<TelemetryMetrics>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let metrics = shared_metrics();
    let stores = open_stores(&config, metrics.clone()).await?;
    let engine = Engine::start(&config, stores, metrics.clone()).await;

    let state = AppState {
        board: engine.board(),
        metrics,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "scada.daq", addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine
        .shutdown(Duration::from_millis(config.shutdown_grace_ms))
        .await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "scada.daq", error = %err, "ctrl_c_listen_failed");
        std::future::pending::<()>().await;
    }
    info!(target: "scada.daq", "shutdown_requested");
}
