// src/forward/command_executor.rs
//! Live execution of intercepted command invocations
//!
//! The shim that triggered the interception sits ahead of the real command
//! on `PATH`, so resolution walks the captured `PATH` for the first regular
//! executable file that is not the same underlying file as the shim itself.
//! Resolved paths are cached per command name for the session. Whatever
//! happens, the intercepted process always observes a (stdout, stderr,
//! exit status) triple.

use crate::traffic::command::CommandDetails;
use crate::traffic::{ResponseSink, TrafficRecord};
use crate::utils::errors::{EngineError, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Executes intercepted commands against their real executables
#[derive(Clone, Default)]
pub struct CommandExecutor {
    /// Resolved real executables, cached per command name
    real_commands: Arc<DashMap<String, PathBuf>>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the cache, for commands the harness replaced before the
    /// session started
    pub fn preset(&self, command: impl Into<String>, real_path: impl Into<PathBuf>) {
        let command = command.into();
        let real_path = real_path.into();
        info!(
            "Storing real executable for {}: {}",
            command,
            real_path.display()
        );
        self.real_commands.insert(command, real_path);
    }

    /// Forget all cached resolutions (session restart)
    pub fn clear(&self) {
        self.real_commands.clear();
    }

    /// Run the invocation against the real executable and return the
    /// (stdout, stderr, exit status) response records in that fixed order
    pub async fn execute(
        &self,
        command: &CommandDetails,
        sink: &ResponseSink,
    ) -> Vec<TrafficRecord> {
        let Some(real_path) = self.resolve(command) else {
            return make_response(
                String::new(),
                format!(
                    "ERROR: Traffic server could not find command '{}' in PATH",
                    command.command_name
                ),
                1,
                sink,
            );
        };
        match run(command, &real_path, sink).await {
            Ok(responses) => responses,
            Err(e) => {
                warn!("Spawning {} failed: {}", real_path.display(), e);
                make_response(String::new(), format!("ERROR: {}", e), 1, sink)
            }
        }
    }

    /// Find the real executable: cached value, otherwise the first PATH
    /// entry that is a regular executable file and not the shim itself
    fn resolve(&self, command: &CommandDetails) -> Option<PathBuf> {
        if let Some(cached) = self.real_commands.get(&command.command_name) {
            return Some(cached.clone());
        }
        debug!("Finding real command to replace {}", command.full_command);
        let path_var = command.path.as_deref()?;
        for dir in std::env::split_paths(path_var) {
            let candidate = dir.join(&command.command_name);
            if is_real_command(&candidate, Path::new(&command.full_command)) {
                info!(
                    "Resolved {} to {}",
                    command.command_name,
                    candidate.display()
                );
                self.real_commands
                    .insert(command.command_name.clone(), candidate.clone());
                return Some(candidate);
            }
        }
        None
    }
}

async fn run(
    command: &CommandDetails,
    real_path: &Path,
    sink: &ResponseSink,
) -> Result<Vec<TrafficRecord>> {
    let mut child = Command::new(real_path);
    child
        .args(&command.args)
        .env_clear()
        .envs(&command.environ)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if !command.cwd.is_empty() {
        child.current_dir(&command.cwd);
    }

    let output = child.output().await.map_err(|e| {
        EngineError::ProcessSpawnFailed(format!(
            "Could not run {}: {}",
            real_path.display(),
            e
        ))
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let status = output.status.code().unwrap_or(1);
    debug!(
        "Command {} exited with status {}",
        command.command_name, status
    );
    Ok(make_response(stdout, stderr, status, sink))
}

/// Whether a PATH candidate is usable: a regular file with an execute bit
/// that is not the same underlying file as the intercepting shim
fn is_real_command(candidate: &Path, shim: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = candidate.metadata() else {
        return false;
    };
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return false;
    }
    !same_file(candidate, shim)
}

/// Device/inode comparison; unknown files are never "the same"
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (a.metadata(), b.metadata()) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
        _ => false,
    }
}

fn make_response(
    stdout: String,
    stderr: String,
    status: i32,
    sink: &ResponseSink,
) -> Vec<TrafficRecord> {
    vec![
        TrafficRecord::stdout(stdout, sink.clone()),
        TrafficRecord::stderr(stderr, sink.clone()),
        TrafficRecord::exit_status(status, sink.clone()),
    ]
}
