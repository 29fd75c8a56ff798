// src/utils/errors.rs
//! Engine error types
//!
//! Most runtime failure in the engine is converted into deterministic
//! recorded/replayed traffic rather than surfaced to the intercepted
//! process; these variants cover the paths that genuinely fail.

use thiserror::Error;

/// Engine-wide error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Session configuration is unusable (e.g. no writable record location)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The replay file could not be opened or read
    #[error("Replay file error: {0}")]
    ReplayFileError(String),

    /// Listener setup or connection handling failed
    #[error("Interception failed: {0}")]
    InterceptionFailed(String),

    /// The trace file could not be written
    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    /// A subprocess could not be spawned
    #[error("Process spawn failed: {0}")]
    ProcessSpawnFailed(String),

    /// A wire payload did not match the expected encoding
    #[error("Payload error: {0}")]
    PayloadError(String),
}

/// Engine-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;
