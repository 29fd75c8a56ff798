// src/recording/trace_writer.rs
//! Append-only trace file writer
//!
//! One record per append, flushed immediately so a crash of the harness
//! never loses completed exchanges. The file stays plain UTF-8 text,
//! interoperable with existing fixtures.

use crate::utils::errors::{EngineError, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writer for the session's trace file
#[derive(Debug)]
pub struct TraceWriter {
    path: PathBuf,
    file: File,
}

impl TraceWriter {
    /// Open the trace file for appending, creating it if needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                EngineError::ConfigError(format!(
                    "No writable record location at {}: {}",
                    path.display(),
                    e
                ))
            })?;
        info!("Recording traffic to {}", path.display());
        Ok(Self { path, file })
    }

    /// Append one serialized record, guaranteeing its trailing newline
    pub fn append(&mut self, description: &str) -> Result<()> {
        let failed = |e: std::io::Error| {
            EngineError::RecordingFailed(format!(
                "Append to {} failed: {}",
                self.path.display(),
                e
            ))
        };
        self.file.write_all(description.as_bytes()).map_err(failed)?;
        if !description.ends_with('\n') {
            self.file.write_all(b"\n").map_err(failed)?;
        }
        self.file.flush().map_err(failed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_normalizes_newlines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.traffic");
        let mut writer = TraceWriter::create(&path).unwrap();

        writer.append("<-CMD:echo hello").unwrap();
        writer.append("->OUT:hello\n").unwrap();
        writer.append("->EXC:0").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "<-CMD:echo hello\n->OUT:hello\n->EXC:0\n");
    }

    #[test]
    fn test_create_fails_without_writable_location() {
        let err = TraceWriter::create("/nonexistent-dir/deep/session.traffic").unwrap_err();
        assert!(matches!(err, EngineError::ConfigError(_)));
    }

    #[test]
    fn test_appends_accumulate_across_sessions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.traffic");
        {
            let mut writer = TraceWriter::create(&path).unwrap();
            writer.append("<-CLI:one").unwrap();
        }
        let mut writer = TraceWriter::create(&path).unwrap();
        writer.append("->SRV:two").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "<-CLI:one\n->SRV:two\n");
    }
}
