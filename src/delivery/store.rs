//! Crash-safe on-disk home for undelivered events.
//!
//! The store is a newline-delimited JSON file holding exactly the current
//! pending set. Writes go to a sibling temp file which is then renamed over
//! the target, so a crash mid-write leaves either the old or the new set.

use crate::event::Event;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Errors raised while persisting the pending set.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialize(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Pending store IO error: {e}"),
            StoreError::Serialize(e) => write!(f, "Pending store serialize error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Durable pending set backed by a JSONL file.
#[derive(Debug, Clone)]
pub struct PendingStore {
    path: PathBuf,
}

impl PendingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted pending set.
    ///
    /// A missing file is an empty set. Each line is parsed on its own; lines
    /// that fail to parse (invalid UTF-8, a torn trailing line) are skipped
    /// with a warning. A file that exists but cannot be read is renamed out
    /// of the way so later saves do not overwrite it.
    pub fn load(&self) -> Vec<Event> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::error!("Could not read pending store {:?}: {}", self.path, e);
                if self.path.is_file() {
                    match self.set_aside() {
                        Ok(moved) => {
                            tracing::warn!("Moved unreadable pending store to {:?}", moved)
                        }
                        Err(e) => tracing::error!(
                            "Could not move unreadable pending store {:?}: {}",
                            self.path,
                            e
                        ),
                    }
                }
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for (idx, line) in content.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed pending entry at {:?}:{}: {}",
                        self.path,
                        idx + 1,
                        e
                    );
                }
            }
        }
        events
    }

    /// Replace the persisted set with `events`.
    ///
    /// An empty set removes the file.
    pub fn save(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return self.clear();
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.temp_path();
        let result = self.write_lines(&tmp_path, events);
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        tracing::debug!("Persisted {} pending events to {:?}", events.len(), self.path);
        Ok(())
    }

    /// Remove the persisted set entirely.
    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_lines(&self, tmp_path: &Path, events: &[Event]) -> Result<(), StoreError> {
        let file = File::create(tmp_path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            serde_json::to_writer(&mut writer, event)
                .map_err(|e| StoreError::Serialize(e.to_string()))?;
            writer.write_all(b"\n")?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }

    /// Rename the store file to `<name>.unreadable-<id>` next to it.
    fn set_aside(&self) -> std::io::Result<PathBuf> {
        let target = self
            .path
            .with_file_name(format!("{}.unreadable-{}", self.file_name(), short_id()));
        fs::rename(&self.path, &target)?;
        Ok(target)
    }

    fn temp_path(&self) -> PathBuf {
        self.path
            .with_file_name(format!(".{}.{}.tmp", self.file_name(), short_id()))
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pending".to_string())
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn sample(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| Event::new(EventKind::Keyboard).with_field("data", i.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.jsonl"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("nested").join("pending.jsonl"));
        let events = sample(3);

        store.save(&events).unwrap();
        assert_eq!(store.load(), events);
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.jsonl"));

        store.save(&sample(5)).unwrap();
        let smaller = sample(2);
        store.save(&smaller).unwrap();

        assert_eq!(store.load(), smaller);
    }

    #[test]
    fn test_empty_save_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.jsonl"));

        store.save(&sample(2)).unwrap();
        assert!(store.path().exists());

        store.save(&[]).unwrap();
        assert!(!store.path().exists());
        // Clearing an already-absent store is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.jsonl");
        let content = [
            r#"{"type":"keyboard","data":"1"}"#,
            r#"{"type":"mouse","data":"2"}"#,
            r#"{"type":"keyboard","data":"#,
            r#"{"type":"screenshot","data":"3","format":"png"}"#,
            r#"{"type":"keyboard","data":"4"}"#,
        ]
        .join("\n");
        fs::write(&path, content).unwrap();

        let loaded = PendingStore::new(&path).load();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[2].kind(), EventKind::Screenshot);
    }

    #[test]
    fn test_torn_trailing_line_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.jsonl");
        fs::write(&path, "{\"type\":\"keyboard\",\"data\":\"a\"}\n{\"type\":\"mou").unwrap();

        let loaded = PendingStore::new(&path).load();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_non_utf8_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.jsonl");
        let mut content = Vec::new();
        content.extend_from_slice(b"{\"type\":\"keyboard\",\"data\":\"1\"}\n");
        content.extend_from_slice(b"{\"type\":\"mouse\",\"data\":\"2\"}\n");
        content.extend_from_slice(b"{\"type\":\"keyboard\",\"data\":\"\xff\xfe\"}\n");
        content.extend_from_slice(b"{\"type\":\"keyboard\",\"data\":\"3\"}\n");
        content.extend_from_slice(b"{\"type\":\"mouse\",\"data\":\"4\"}\n");
        fs::write(&path, content).unwrap();

        let store = PendingStore::new(&path);
        let loaded = store.load();
        assert_eq!(loaded.len(), 4);
        let data: Vec<_> = loaded
            .iter()
            .map(|e| e.get("data").and_then(|v| v.as_str()).unwrap().to_string())
            .collect();
        assert_eq!(data, ["1", "2", "3", "4"]);

        // Rewriting keeps every valid entry.
        store.save(&loaded).unwrap();
        assert_eq!(store.load(), loaded);
    }

    #[test]
    fn test_set_aside_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.jsonl"));
        store.save(&sample(2)).unwrap();
        let before = fs::read(store.path()).unwrap();

        let moved = store.set_aside().unwrap();
        assert!(!store.path().exists());
        assert!(moved
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("pending.jsonl.unreadable-"));
        assert_eq!(fs::read(&moved).unwrap(), before);

        // A fresh save does not touch the moved file.
        store.save(&sample(1)).unwrap();
        assert_eq!(fs::read(&moved).unwrap(), before);
    }

    #[test]
    fn test_unreadable_directory_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.jsonl");
        fs::create_dir(&path).unwrap();

        let store = PendingStore::new(&path);
        assert!(store.load().is_empty());
        assert!(path.is_dir());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.jsonl"));
        store.save(&sample(4)).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
