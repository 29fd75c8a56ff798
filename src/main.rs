// src/main.rs
//! Mimic Traffic Engine
//!
//! Standalone capture/replay proxy daemon. Binds an ephemeral port,
//! publishes its address for shim and client processes, and records or
//! replays traffic until interrupted.

use anyhow::{Context, Result};
use mimic_engine::observability::init_tracing;
use mimic_engine::{CaptureConfig, SessionMode, TrafficServer};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting Mimic traffic engine v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = CaptureConfig::load()?;
    info!("Configuration loaded: {:?}", config);

    let server = TrafficServer::bind(&config).await?;

    match config.session.mode {
        SessionMode::Record => {
            let path = config
                .session
                .record_file
                .clone()
                .context("session.record_file is required in record mode")?;
            server.start_recording(path)?;
        }
        SessionMode::Replay => {
            let path = config
                .session
                .replay_file
                .clone()
                .context("session.replay_file is required in replay mode")?;
            server.start_replaying(path, config.env_filter())?;
        }
        SessionMode::Off => {
            info!("Interception disabled; listener stays idle");
        }
    }

    info!("Traffic server ready on {}", server.address());

    // Graceful shutdown: stop accepting, let in-flight exchanges finish
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Received shutdown signal, cleaning up...");

    server.stop();
    server.shutdown().await;
    info!("Server stopped gracefully");
    Ok(())
}
