// src/observability.rs
//! Tracing and logging initialization

use crate::utils::errors::{EngineError, Result};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG` when set, defaulting to `info` otherwise. Safe to call
/// once per process; a second call reports a configuration error.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| EngineError::ConfigError(format!("Failed to init tracing: {}", e)))
}
