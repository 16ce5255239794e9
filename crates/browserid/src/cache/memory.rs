//! In-Memory Cache

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::RwLock;

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use super::CacheStore;
use crate::error::{BidError, BidResult};

/// Volatile cache backed by a locked map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Value>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> BidResult<Value> {
        self.read().get(key).cloned().ok_or(BidError::CacheKeyNotFound)
    }

    fn set(&self, key: &str, value: Value) -> BidResult<()> {
        self.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> BidResult<()> {
        self.write()
            .remove(key)
            .map(|_| ())
            .ok_or(BidError::CacheKeyNotFound)
    }

    fn entries(&self) -> BidResult<Vec<(String, Value)>> {
        Ok(self
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn clear(&self) -> BidResult<()> {
        self.write().clear();
        Ok(())
    }
}
