//! Artifact store trait, store limits and cache statistics.

use molviz_core::{MolvizConfig, MolvizResult, StoreKey, DEFAULT_MAX_ENTRIES, DEFAULT_TRIM_TARGET};

/// Size bounds enforced by [`ArtifactStore::trim_and_flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// A trim only happens once the store holds more than this many entries.
    pub max_entries: usize,
    /// Number of entries left after a trim.
    pub trim_target: usize,
}

impl StoreLimits {
    /// `trim_target` is clamped to `max_entries`.
    pub fn new(max_entries: usize, trim_target: usize) -> Self {
        Self {
            max_entries,
            trim_target: trim_target.min(max_entries),
        }
    }

    pub fn from_config(config: &MolvizConfig) -> Self {
        Self::new(config.max_entries, config.trim_target)
    }

    /// How many of `len` entries a trim evicts.
    pub fn excess(&self, len: u64) -> u64 {
        if len > self.max_entries as u64 {
            len - self.trim_target as u64
        } else {
            0
        }
    }
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TRIM_TARGET)
    }
}

/// Result of a trim-and-flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimOutcome {
    pub evicted: u64,
    pub remaining: u64,
}

/// Persistent mapping from store key to artifact bytes.
///
/// Operations are synchronous and short. Implementations must be thread-safe;
/// callers that need lookup-render-write atomicity serialize above this layer.
///
/// # Eviction
///
/// Every `put` gives the entry the newest insertion position, overwrites
/// included. `trim_and_flush` evicts oldest-first.
pub trait ArtifactStore: Send + Sync {
    /// Stored bytes for `key`, if any. No side effects.
    fn get(&self, key: &StoreKey) -> MolvizResult<Option<Vec<u8>>>;

    /// Insert or replace the bytes for `key`. Last writer wins.
    fn put(&self, key: &StoreKey, bytes: &[u8]) -> MolvizResult<()>;

    fn contains(&self, key: &StoreKey) -> MolvizResult<bool>;

    /// Number of entries.
    fn len(&self) -> MolvizResult<u64>;

    fn is_empty(&self) -> MolvizResult<bool> {
        Ok(self.len()? == 0)
    }

    /// If the store holds more than `max_entries`, evict oldest entries until
    /// `trim_target` remain, then force everything to durable media.
    ///
    /// Safe to call repeatedly; a no-op on a small store.
    fn trim_and_flush(&self) -> MolvizResult<TrimOutcome>;

    fn limits(&self) -> StoreLimits;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

/// Statistics about rendering cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Fetches answered from the store.
    pub hits: u64,
    /// Fetches that had to render.
    pub misses: u64,
    /// Successful backend renders.
    pub renders: u64,
    /// Misses that ended in an error artifact.
    pub failures: u64,
    /// Store reads or writes that failed during a fetch.
    pub store_errors: u64,
    /// Entries removed by trims.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
