//! Artifact storage.
//!
//! Maps cache keys to previously computed compile output. The shipped store
//! is a plain in-memory map with no eviction, no TTL, and no persistence;
//! entries live for the process lifetime. A bounded store can be substituted
//! through the [`ArtifactStore`] trait without touching the executor.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use time::OffsetDateTime;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// A cached compile result.
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    /// The exact bytes the handler produced for this key.
    pub contents: Bytes,
    /// The source file's modification time as observed when `contents` was
    /// computed, not the time of caching.
    pub mtime: OffsetDateTime,
}

/// Key-to-artifact mapping consumed by the executor.
///
/// `set` is a plain overwrite; concurrent writers for the same key race and
/// the last write wins.
pub trait ArtifactStore: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedArtifact>;
    fn set(&self, key: String, artifact: CachedArtifact);
}

/// Unbounded in-memory artifact store.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CachedArtifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached artifacts.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the keys currently stored, sorted for stable output.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = rw_read(&self.entries, SOURCE, "keys")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Drop every entry, returning how many were evicted.
    pub fn clear(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        let evicted = entries.len();
        entries.clear();
        evicted
    }

    /// Back-date every entry's freshness stamp so the next execution misses
    /// and recomputes, without dropping the entries themselves. Returns how
    /// many entries were touched.
    pub fn dirty(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "dirty");
        for artifact in entries.values_mut() {
            artifact.mtime = OffsetDateTime::UNIX_EPOCH;
        }
        entries.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, key: &str) -> Option<CachedArtifact> {
        rw_read(&self.entries, SOURCE, "get").get(key).cloned()
    }

    fn set(&self, key: String, artifact: CachedArtifact) {
        rw_write(&self.entries, SOURCE, "set").insert(key, artifact);
    }
}
