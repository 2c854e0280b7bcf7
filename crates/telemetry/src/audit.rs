//! Audit trail of notable records as JSON lines.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Appends one JSON document per line to an optional audit file.
///
/// A log without a path accepts and drops every sample.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new<P: AsRef<Path>>(path: Option<P>) -> Self {
        Self {
            path: path.map(|p| p.as_ref().to_path_buf()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Write a sample payload to the audit file.
    ///
    /// # Arguments
    /// * `kind` - Sample label stored next to the payload
    /// * `payload` - Serializable payload to write
    pub fn record<T: Serialize>(&self, kind: &str, payload: &T) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let line = serde_json::to_string(&serde_json::json!({
            "kind": kind,
            "payload": payload,
        }))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!("Wrote {} audit sample to {:?}", kind, path);
        Ok(())
    }
}
