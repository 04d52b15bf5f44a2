use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::clock::readable_time;
use crate::configs::store::write_atomically;
use crate::errors::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub message: String,
    /// Human-readable local time
    pub time: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

/// Append-only event log shown on the dashboard
pub trait History: Send + Sync {
    fn append(&self, event: &str, timestamp: OffsetDateTime) -> Result<(), StoreError>;

    fn entries(&self) -> Result<Vec<HistoryEntry>, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

/// [`History`] stored as a JSON array, rewritten on every append
pub struct JsonHistory {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonHistory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl History for JsonHistory {
    fn append(&self, event: &str, timestamp: OffsetDateTime) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;

        let mut entries = self.read()?;
        entries.push(HistoryEntry {
            message: event.to_string(),
            time: readable_time(timestamp),
            timestamp: timestamp.unix_timestamp(),
        });

        write_atomically(&self.path, &serde_json::to_vec_pretty(&entries)?)?;

        tracing::debug!("history written: {}", event);

        Ok(())
    }

    fn entries(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.read()
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        write_atomically(&self.path, b"[]")
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn test_append_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonHistory::new(dir.path().join("history.json"));

        history
            .append("Low battery", datetime!(2024-03-05 14:07 UTC))
            .unwrap();
        history
            .append("Power changed to Main", datetime!(2024-03-05 14:30 UTC))
            .unwrap();

        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "Low battery");
        assert_eq!(entries[0].time, "02:07 PM, Mar 05, 2024");

        history.clear().unwrap();
        assert!(history.entries().unwrap().is_empty());
    }
}
