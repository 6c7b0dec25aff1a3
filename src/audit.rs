//! Local audit trail of every accepted event.
//!
//! Each recorded event is appended to `events.jsonl` in the log directory,
//! independent of whether it has reached the remote collector yet.

use crate::event::Event;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Audit log file name inside the log directory.
pub const AUDIT_FILE_NAME: &str = "events.jsonl";

/// Audit log errors.
#[derive(Debug)]
pub enum AuditError {
    Io(std::io::Error),
    Serialize(String),
}

impl std::fmt::Display for AuditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditError::Io(e) => write!(f, "Audit log IO error: {e}"),
            AuditError::Serialize(e) => write!(f, "Audit log serialize error: {e}"),
        }
    }
}

impl std::error::Error for AuditError {}

impl From<std::io::Error> for AuditError {
    fn from(e: std::io::Error) -> Self {
        AuditError::Io(e)
    }
}

/// Append-only JSONL log of recorded events.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    /// Create an audit log writing to `<dir>/events.jsonl`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(AUDIT_FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a JSON line.
    pub fn append(&self, event: &Event) -> Result<(), AuditError> {
        let mut line =
            serde_json::to_string(event).map_err(|e| AuditError::Serialize(e.to_string()))?;
        line.push('\n');

        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read the last `limit` parseable entries, oldest first.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<Event>, AuditError> {
        let content = {
            let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
            match std::fs::read_to_string(&self.path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
        };

        let events: Vec<Event> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let skip = events.len().saturating_sub(limit);
        Ok(events.into_iter().skip(skip).collect())
    }
}
