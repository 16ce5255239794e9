//! File-Backed Cache
//!
//! One JSON object per file, `{"<key>": <value>, ...}`, no sidecar.
//! Mutations rewrite the whole document into a temporary file in the same
//! directory and rename it over the original, so readers never observe a
//! torn write.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

// Layer 2: Third-party crate imports
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

// Layer 3: Internal module imports
use super::CacheStore;
use crate::error::{BidError, BidResult};

/// Persistent cache backed by an atomically-replaced JSON file.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, Value>>,
}

impl FileCache {
    /// Open (or create) the cache at `path`.
    pub fn open(path: PathBuf) -> BidResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BidError::CacheOpenError(e.to_string()))?;
        }

        let entries = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice::<HashMap<String, Value>>(&raw)
                .map_err(|e| BidError::CacheOpenError(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(BidError::CacheOpenError(e.to_string())),
        };

        debug!(path = %path.display(), entries = entries.len(), "opened file cache");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write the full entry map to a sibling temp file and rename it into
    /// place.
    fn persist(&self, entries: &HashMap<String, Value>) -> BidResult<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut scratch = NamedTempFile::new_in(&parent)
            .map_err(|e| BidError::CacheOpenError(e.to_string()))?;
        let raw = serde_json::to_vec(entries).map_err(|e| BidError::CacheOpenError(e.to_string()))?;
        scratch
            .write_all(&raw)
            .map_err(|e| BidError::CacheOpenError(e.to_string()))?;
        scratch
            .persist(&self.path)
            .map_err(|e| BidError::CacheOpenError(e.to_string()))?;
        Ok(())
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> BidResult<Value> {
        self.lock().get(key).cloned().ok_or(BidError::CacheKeyNotFound)
    }

    fn set(&self, key: &str, value: Value) -> BidResult<()> {
        let mut entries = self.lock();
        let previous = entries.insert(key.to_string(), value);

        if let Err(e) = self.persist(&entries) {
            // All-or-nothing: roll the map back on a failed persist.
            match previous {
                Some(value) => entries.insert(key.to_string(), value),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> BidResult<()> {
        let mut entries = self.lock();
        let previous = entries.remove(key).ok_or(BidError::CacheKeyNotFound)?;

        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn entries(&self) -> BidResult<Vec<(String, Value)>> {
        Ok(self
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn clear(&self) -> BidResult<()> {
        let mut entries = self.lock();
        let previous = std::mem::take(&mut *entries);
        if let Err(e) = self.persist(&entries) {
            *entries = previous;
            return Err(e);
        }
        Ok(())
    }
}
