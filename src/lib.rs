// src/lib.rs
//! Mimic Traffic Engine Library
//!
//! A capture/replay proxy that sits between a test harness and a system
//! under test. Every client/server and process-invocation exchange passes
//! through it and is either forwarded live while a textual trace is
//! persisted, or satisfied from a previously captured trace, so tests run
//! deterministically without the real backend.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **traffic**: exchange variants, text encoding, the literal codec
//! - **replay**: trace-file index with exact and fuzzy best-match lookup
//! - **forward**: live socket relay, RPC invocation, subprocess execution
//! - **interception**: TCP listener, exchange processing, session control
//! - **recording**: append-only trace persistence
//! - **observability**: tracing and logging setup
//! - **utils**: configuration and error types

// Public module exports
pub mod forward;
pub mod interception;
pub mod observability;
pub mod recording;
pub mod replay;
pub mod traffic;
pub mod utils;

// Re-export commonly used types
pub use interception::server::TrafficServer;
pub use replay::ReplayIndex;
pub use traffic::{TrafficKind, TrafficRecord};
pub use utils::config::{CaptureConfig, EnvFilter, SessionMode, WireProtocol};
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
