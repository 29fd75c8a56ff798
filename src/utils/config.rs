// src/utils/config.rs
//! Engine configuration
//!
//! Loaded from an optional `mimic-engine.toml` plus `MIMIC_*` environment
//! overrides. Carries the inputs the engine consumes but does not produce:
//! the listen host, the wire protocol of the intercepted service, the
//! per-command environment retention lists and, for the standalone binary,
//! the session mode and trace file paths.

use crate::utils::errors::{EngineError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Wire protocol spoken by the intercepted service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    /// Opaque request/response text over a socket
    #[default]
    Raw,

    /// `method(args...)` calls answered by a literal value or a declared fault
    Rpc,
}

/// Session mode for the standalone binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Interception disabled
    #[default]
    Off,

    /// Forward live and persist a trace
    Record,

    /// Satisfy requests from a previously captured trace
    Replay,
}

/// Listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind; the port is always ephemeral
    pub host: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
        }
    }
}

/// Environment retention settings for command interception
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnvSettings {
    /// Variables retained for every intercepted command
    pub retain: Vec<String>,

    /// Extra variables retained per command name
    pub retain_per_command: HashMap<String, Vec<String>>,
}

/// Session settings consumed by the standalone binary
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Mode the binary starts in
    pub mode: SessionMode,

    /// Trace file written in record mode
    pub record_file: Option<PathBuf>,

    /// Trace file read in replay mode
    pub replay_file: Option<PathBuf>,
}

/// Engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Listener settings
    pub server: ServerSettings,

    /// Wire protocol of the intercepted service
    pub protocol: WireProtocol,

    /// Environment retention lists
    pub environment: EnvSettings,

    /// Session settings for the standalone binary
    pub session: SessionSettings,
}

impl CaptureConfig {
    /// Load configuration from `mimic-engine.toml` (if present) and
    /// `MIMIC_*` environment variables
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("mimic-engine").required(false))
            .add_source(config::Environment::with_prefix("MIMIC").separator("__"))
            .build()
            .map_err(|e| EngineError::ConfigError(format!("Failed to load config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| EngineError::ConfigError(format!("Invalid config: {}", e)))
    }

    /// Build the environment filter described by this configuration,
    /// taking the baseline from the current process environment
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::new(
            self.environment.retain.clone(),
            self.environment.retain_per_command.clone(),
        )
    }
}

/// Decides which environment variables an intercepted command keeps in its
/// recorded description, and abbreviates values against a session-start
/// baseline so unchanged machinery (long `PATH`s and the like) does not
/// drown the trace.
#[derive(Debug, Clone, Default)]
pub struct EnvFilter {
    retain: Vec<String>,
    retain_per_command: HashMap<String, Vec<String>>,
    baseline: HashMap<String, String>,
}

impl EnvFilter {
    /// Create a filter with the baseline snapshotted from the current
    /// process environment
    pub fn new(retain: Vec<String>, retain_per_command: HashMap<String, Vec<String>>) -> Self {
        Self {
            retain,
            retain_per_command,
            baseline: std::env::vars().collect(),
        }
    }

    /// Replace the baseline (tests and harnesses with synthetic environments)
    pub fn with_baseline(mut self, baseline: HashMap<String, String>) -> Self {
        self.baseline = baseline;
        self
    }

    /// Variables retained for the given command: the global list followed by
    /// the per-command list
    pub fn retained(&self, command: &str) -> Vec<&str> {
        let mut vars: Vec<&str> = self.retain.iter().map(String::as_str).collect();
        if let Some(extra) = self.retain_per_command.get(command) {
            vars.extend(extra.iter().map(String::as_str));
        }
        vars
    }

    /// Baseline value of a variable at session start, if any
    pub fn baseline_value(&self, var: &str) -> Option<&str> {
        self.baseline.get(var).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.protocol, WireProtocol::Raw);
        assert_eq!(config.session.mode, SessionMode::Off);
        assert!(config.environment.retain.is_empty());
    }

    #[test]
    fn test_env_filter_composite_retention() {
        let mut per_command = HashMap::new();
        per_command.insert("make".to_string(), vec!["MAKEFLAGS".to_string()]);
        let filter = EnvFilter::new(vec!["DISPLAY".to_string()], per_command)
            .with_baseline(HashMap::new());

        assert_eq!(filter.retained("make"), vec!["DISPLAY", "MAKEFLAGS"]);
        assert_eq!(filter.retained("echo"), vec!["DISPLAY"]);
    }

    #[test]
    fn test_env_filter_baseline() {
        let mut baseline = HashMap::new();
        baseline.insert("PATH".to_string(), "/usr/bin".to_string());
        let filter = EnvFilter::default().with_baseline(baseline);

        assert_eq!(filter.baseline_value("PATH"), Some("/usr/bin"));
        assert_eq!(filter.baseline_value("HOME"), None);
    }
}
