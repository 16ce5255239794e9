//! Caches
//!
//! Replay, ticket and authority state share one content-addressed
//! contract: string keys, JSON object values, snapshot iteration, and
//! all-or-nothing insertion. Persistent caches are JSON files replaced
//! atomically; volatile caches are in-memory maps. The choice is made per
//! cache at acquisition time.

// Layer 1: Standard library imports
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use crate::error::BidResult;

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

/// The common cache contract.
///
/// `entries` visits every entry present at call time exactly once; `get`
/// after `set` in one process returns the set value; `set` is
/// all-or-nothing (a failed persist leaves the previous state).
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Fetch an entry. `CacheKeyNotFound` on miss.
    fn get(&self, key: &str) -> BidResult<Value>;

    /// Insert or replace an entry.
    fn set(&self, key: &str, value: Value) -> BidResult<()>;

    /// Delete an entry. `CacheKeyNotFound` when absent.
    fn remove(&self, key: &str) -> BidResult<()>;

    /// Snapshot of all entries.
    fn entries(&self) -> BidResult<Vec<(String, Value)>>;

    /// Remove every entry.
    fn clear(&self) -> BidResult<()>;
}

/// A shareable handle on a cache.
#[derive(Debug, Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    /// A volatile in-memory cache.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(MemoryCache::new()),
        }
    }

    /// A persistent file-backed cache.
    pub fn file(path: impl Into<PathBuf>) -> BidResult<Self> {
        Ok(Self {
            store: Arc::new(FileCache::open(path.into())?),
        })
    }

    /// The default persistent cache for `purpose`.
    pub fn default_for(purpose: CachePurpose) -> BidResult<Self> {
        Self::file(default_cache_path(purpose))
    }

    /// Fetch an entry. `CacheKeyNotFound` on miss.
    pub fn get(&self, key: &str) -> BidResult<Value> {
        self.store.get(key)
    }

    /// Insert or replace an entry.
    pub fn set(&self, key: &str, value: Value) -> BidResult<()> {
        self.store.set(key, value)
    }

    /// Delete an entry.
    pub fn remove(&self, key: &str) -> BidResult<()> {
        self.store.remove(key)
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> BidResult<Vec<(String, Value)>> {
        self.store.entries()
    }

    /// Remove every entry.
    pub fn clear(&self) -> BidResult<()> {
        self.store.clear()
    }
}

/// What a cache is used for; selects its default location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePurpose {
    Replay,
    Ticket,
    Authority,
}

impl CachePurpose {
    fn file_stem(self) -> &'static str {
        match self {
            CachePurpose::Replay => "replay",
            CachePurpose::Ticket => "tickets",
            CachePurpose::Authority => "authority",
        }
    }
}

/// Default on-disk location for a cache: the per-user cache directory when
/// the platform provides one, `/tmp` otherwise.
pub fn default_cache_path(purpose: CachePurpose) -> PathBuf {
    match dirs::cache_dir() {
        Some(base) => base
            .join("browserid")
            .join(format!("browserid.{}.json", purpose.file_stem())),
        None => PathBuf::from(format!("/tmp/.browserid.{}.json", purpose.file_stem())),
    }
}
