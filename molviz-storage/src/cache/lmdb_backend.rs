//! LMDB-backed artifact store.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped,
//! crash-safe store under `<cache_dir>/molimages/`.
//!
//! # Layout
//!
//! LMDB keys are limited to 511 bytes, so entries are keyed by the SHA-256 of
//! the store key. Each value carries the full store key so a lookup can verify
//! it found the right entry:
//!
//! `[seq: u64 BE][key_len: u32 BE][store key][artifact bytes]`
//!
//! `seq` is the insertion sequence number used for oldest-first eviction.
//!
//! # One handle per location
//!
//! [`LmdbArtifactStore::open`] keeps a process-wide registry of weak handles,
//! so opening the same directory twice yields the same `Arc`. The environment
//! closes when the last handle is dropped, after one final trim-and-flush.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use molviz_core::{MolvizConfig, MolvizError, MolvizResult, StoreError, StoreKey};
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use super::traits::{ArtifactStore, StoreLimits, TrimOutcome};

const SEQ_LEN: usize = 8;
const KEY_LEN_LEN: usize = 4;
const HEADER_LEN: usize = SEQ_LEN + KEY_LEN_LEN;

static OPEN_STORES: Lazy<Mutex<HashMap<PathBuf, Weak<LmdbArtifactStore>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment at {path}: {reason}")]
    EnvOpen { path: String, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A stored value does not follow the entry layout.
    #[error("Corrupt entry for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// I/O error while preparing the store directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<LmdbStoreError> for MolvizError {
    fn from(e: LmdbStoreError) -> Self {
        let store = match e {
            LmdbStoreError::EnvOpen { path, reason } => StoreError::Unavailable { path, reason },
            LmdbStoreError::Io { path, source } => StoreError::Unavailable {
                path,
                reason: source.to_string(),
            },
            LmdbStoreError::Transaction(reason) => StoreError::Transaction { reason },
            LmdbStoreError::Corrupt { key, reason } => StoreError::Corrupt { key, reason },
        };
        MolvizError::Store(store)
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// Durable artifact store.
///
/// # Example
///
/// ```ignore
/// let store = LmdbArtifactStore::open(&MolvizConfig::default())?;
/// let key = CacheKey::new("CCO", 200).store_key();
/// store.put(&key, b"<svg/>")?;
/// assert_eq!(store.get(&key)?, Some(b"<svg/>".to_vec()));
/// ```
pub struct LmdbArtifactStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    path: PathBuf,
    limits: StoreLimits,
    next_seq: AtomicU64,
}

impl LmdbArtifactStore {
    /// Open the store at `config.store_path()`.
    pub fn open(config: &MolvizConfig) -> MolvizResult<Arc<Self>> {
        Self::open_at(
            config.store_path(),
            StoreLimits::from_config(config),
            config.map_size_mb,
        )
    }

    /// Open the store in `path`, creating the directory if needed.
    ///
    /// If the location is already open in this process the existing handle is
    /// returned and `limits` / `map_size_mb` are ignored.
    pub fn open_at<P: AsRef<Path>>(
        path: P,
        limits: StoreLimits,
        map_size_mb: usize,
    ) -> MolvizResult<Arc<Self>> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|source| LmdbStoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let canonical = std::fs::canonicalize(path).map_err(|source| LmdbStoreError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut registry = OPEN_STORES
            .lock()
            .map_err(|_| MolvizError::Store(StoreError::LockPoisoned))?;
        registry.retain(|_, handle| handle.strong_count() > 0);

        if let Some(existing) = registry.get(&canonical).and_then(Weak::upgrade) {
            tracing::debug!(path = %canonical.display(), "Reusing open artifact store");
            return Ok(existing);
        }

        let store = Arc::new(Self::create(&canonical, limits, map_size_mb)?);
        registry.insert(canonical, Arc::downgrade(&store));
        Ok(store)
    }

    fn create(path: &Path, limits: StoreLimits, map_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let map_size = map_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| LmdbStoreError::EnvOpen {
                path: path.display().to_string(),
                reason: format!("map size of {} MB overflows", map_size_mb),
            })?;

        // SAFETY: the registry guarantees a single environment per path in this
        // process, and nothing else in the crate maps these files.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path)
        }
        .map_err(|e| LmdbStoreError::EnvOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::EnvOpen {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_err)?;

        let next_seq = {
            let rtxn = env.read_txn().map_err(txn_err)?;
            let mut max_seq = None;
            for item in db.iter(&rtxn).map_err(txn_err)? {
                let (_, value) = item.map_err(txn_err)?;
                if let Some(seq) = read_seq(value) {
                    max_seq = Some(max_seq.map_or(seq, |m: u64| m.max(seq)));
                }
            }
            max_seq.map_or(0, |m| m + 1)
        };

        tracing::info!(path = %path.display(), next_seq, "Opened artifact store");

        Ok(Self {
            env,
            db,
            path: path.to_path_buf(),
            limits,
            next_seq: AtomicU64::new(next_seq),
        })
    }

    /// Canonical directory of this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the raw value for `key`, returning `(seq, artifact)` only if the
    /// stored key matches.
    fn lookup(&self, key: &StoreKey) -> Result<Option<(u64, Vec<u8>)>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let Some(raw) = self.db.get(&rtxn, &hash_key(key)).map_err(txn_err)? else {
            return Ok(None);
        };

        let entry = decode_entry(raw).map_err(|reason| LmdbStoreError::Corrupt {
            key: key.to_string(),
            reason,
        })?;

        if entry.store_key != key.as_bytes() {
            tracing::warn!(store_key = %key, "Hashed key collision in artifact store");
            return Ok(None);
        }

        Ok(Some((entry.seq, entry.bytes.to_vec())))
    }

    fn trim(&self) -> Result<u64, LmdbStoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let len = self.db.len(&wtxn).map_err(txn_err)?;
        let excess = self.limits.excess(len);
        if excess == 0 {
            return Ok(0);
        }

        let mut order: Vec<(u64, Vec<u8>)> = Vec::with_capacity(len as usize);
        for item in self.db.iter(&wtxn).map_err(txn_err)? {
            let (key, value) = item.map_err(txn_err)?;
            // Unreadable entries sort first and are evicted first.
            order.push((read_seq(value).unwrap_or(0), key.to_vec()));
        }
        order.sort_unstable();

        for (_, key) in order.iter().take(excess as usize) {
            self.db.delete(&mut wtxn, key).map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;

        tracing::info!(
            path = %self.path.display(),
            evicted = excess,
            remaining = len - excess,
            "Trimmed artifact store"
        );
        Ok(excess)
    }
}

impl ArtifactStore for LmdbArtifactStore {
    fn get(&self, key: &StoreKey) -> MolvizResult<Option<Vec<u8>>> {
        Ok(self.lookup(key)?.map(|(_, bytes)| bytes))
    }

    fn put(&self, key: &StoreKey, bytes: &[u8]) -> MolvizResult<()> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let value = encode_entry(seq, key, bytes);

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, &hash_key(key), &value)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    fn contains(&self, key: &StoreKey) -> MolvizResult<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    fn len(&self) -> MolvizResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.db.len(&rtxn).map_err(txn_err)?)
    }

    fn trim_and_flush(&self) -> MolvizResult<TrimOutcome> {
        let evicted = self.trim()?;
        self.env.force_sync().map_err(txn_err)?;
        Ok(TrimOutcome {
            evicted,
            remaining: self.len()?,
        })
    }

    fn limits(&self) -> StoreLimits {
        self.limits
    }

    fn name(&self) -> &str {
        "lmdb"
    }
}

impl Drop for LmdbArtifactStore {
    fn drop(&mut self) {
        match self.trim_and_flush() {
            Ok(outcome) => tracing::debug!(
                path = %self.path.display(),
                evicted = outcome.evicted,
                remaining = outcome.remaining,
                "Closed artifact store"
            ),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Final trim-and-flush failed"
            ),
        }
    }
}

impl std::fmt::Debug for LmdbArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbArtifactStore")
            .field("path", &self.path)
            .field("limits", &self.limits)
            .finish()
    }
}

// ============================================================================
// ENTRY ENCODING
// ============================================================================

struct EntryRef<'a> {
    seq: u64,
    store_key: &'a [u8],
    bytes: &'a [u8],
}

fn hash_key(key: &StoreKey) -> Vec<u8> {
    Sha256::digest(key.as_bytes()).to_vec()
}

fn encode_entry(seq: u64, key: &StoreKey, bytes: &[u8]) -> Vec<u8> {
    let key_bytes = key.as_bytes();
    let mut value = Vec::with_capacity(HEADER_LEN + key_bytes.len() + bytes.len());
    value.extend_from_slice(&seq.to_be_bytes());
    value.extend_from_slice(&(key_bytes.len() as u32).to_be_bytes());
    value.extend_from_slice(key_bytes);
    value.extend_from_slice(bytes);
    value
}

fn read_seq(raw: &[u8]) -> Option<u64> {
    let seq: [u8; SEQ_LEN] = raw.get(..SEQ_LEN)?.try_into().ok()?;
    Some(u64::from_be_bytes(seq))
}

fn decode_entry(raw: &[u8]) -> Result<EntryRef<'_>, String> {
    if raw.len() < HEADER_LEN {
        return Err(format!("value too short: {} bytes", raw.len()));
    }
    let seq = read_seq(raw).ok_or_else(|| "missing sequence number".to_string())?;
    let key_len: [u8; KEY_LEN_LEN] = raw[SEQ_LEN..HEADER_LEN]
        .try_into()
        .map_err(|_| "missing key length".to_string())?;
    let key_len = u32::from_be_bytes(key_len) as usize;

    let key_end = HEADER_LEN
        .checked_add(key_len)
        .filter(|end| *end <= raw.len())
        .ok_or_else(|| format!("key length {} exceeds value", key_len))?;

    Ok(EntryRef {
        seq,
        store_key: &raw[HEADER_LEN..key_end],
        bytes: &raw[key_end..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use molviz_core::CacheKey;
    use molviz_test_utils::fixtures;
    use tempfile::TempDir;

    fn key(structure: &str) -> StoreKey {
        fixtures::plain_key(structure).store_key()
    }

    fn open_with(dir: &TempDir, max_entries: usize, trim_target: usize) -> Arc<LmdbArtifactStore> {
        LmdbArtifactStore::open_at(dir.path(), StoreLimits::new(max_entries, trim_target), 10)
            .expect("store should open")
    }

    #[test]
    fn test_put_and_get() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let store = open_with(&dir, 100, 90);

        store.put(&key("CCO"), b"<svg>ethanol</svg>").expect("put");
        assert_eq!(
            store.get(&key("CCO")).expect("get"),
            Some(b"<svg>ethanol</svg>".to_vec())
        );
        assert!(store.contains(&key("CCO")).expect("contains"));
        assert_eq!(store.len().expect("len"), 1);
    }

    #[test]
    fn test_overflowing_map_size_is_rejected() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let result = LmdbArtifactStore::open_at(dir.path(), StoreLimits::default(), usize::MAX / 1024);

        match result {
            Err(MolvizError::Store(StoreError::Unavailable { reason, .. })) => {
                assert!(reason.contains("overflows"), "unexpected reason: {}", reason);
            }
            other => panic!("expected Unavailable, got {:?}", other.map(|s| s.path().to_path_buf())),
        }
    }

    #[test]
    fn test_get_missing() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let store = open_with(&dir, 100, 90);

        assert_eq!(store.get(&key("CCO")).expect("get"), None);
        assert!(!store.contains(&key("CCO")).expect("contains"));
        assert!(store.is_empty().expect("is_empty"));
    }

    #[test]
    fn test_overwrite_last_writer_wins() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let store = open_with(&dir, 100, 90);

        store.put(&key("CCO"), b"first").expect("put");
        store.put(&key("CCO"), b"second").expect("put");

        assert_eq!(store.get(&key("CCO")).expect("get"), Some(b"second".to_vec()));
        assert_eq!(store.len().expect("len"), 1);
    }

    #[test]
    fn test_key_longer_than_lmdb_limit() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let store = open_with(&dir, 100, 90);

        let long = CacheKey::new("C".repeat(2000), 200)
            .with_title("t".repeat(600))
            .store_key();
        store.put(&long, b"long").expect("put");
        assert_eq!(store.get(&long).expect("get"), Some(b"long".to_vec()));
    }

    #[test]
    fn test_trim_evicts_oldest_first() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let store = open_with(&dir, 5, 3);

        let keys: Vec<StoreKey> = (1..=7).map(|n| key(&"C".repeat(n))).collect();
        for k in &keys {
            store.put(k, k.as_bytes()).expect("put");
        }

        let outcome = store.trim_and_flush().expect("trim");
        assert_eq!(outcome, TrimOutcome { evicted: 4, remaining: 3 });

        for k in &keys[..4] {
            assert!(!store.contains(k).expect("contains"));
        }
        for k in &keys[4..] {
            assert!(store.contains(k).expect("contains"));
        }
    }

    #[test]
    fn test_overwrite_moves_entry_to_newest() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let store = open_with(&dir, 5, 3);

        let keys: Vec<StoreKey> = (1..=6).map(|n| key(&"C".repeat(n))).collect();
        for k in &keys {
            store.put(k, b"x").expect("put");
        }
        // Rewriting the oldest entry makes it the newest.
        store.put(&keys[0], b"y").expect("put");

        let outcome = store.trim_and_flush().expect("trim");
        assert_eq!(outcome.evicted, 3);
        assert!(store.contains(&keys[0]).expect("contains"));
        assert!(!store.contains(&keys[1]).expect("contains"));
        assert!(!store.contains(&keys[3]).expect("contains"));
        assert!(store.contains(&keys[4]).expect("contains"));
        assert!(store.contains(&keys[5]).expect("contains"));
    }

    #[test]
    fn test_trim_is_noop_when_small_and_repeatable() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let store = open_with(&dir, 5, 3);

        assert_eq!(store.trim_and_flush().expect("trim"), TrimOutcome::default());

        for n in 1..=5 {
            store.put(&key(&"C".repeat(n)), b"x").expect("put");
        }
        let first = store.trim_and_flush().expect("trim");
        let second = store.trim_and_flush().expect("trim");
        assert_eq!(first, TrimOutcome { evicted: 0, remaining: 5 });
        assert_eq!(second, first);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = open_with(&dir, 100, 90);
            store.put(&key("c1ccccc1"), b"<svg>benzene</svg>").expect("put");
        }

        let reopened = open_with(&dir, 100, 90);
        assert_eq!(
            reopened.get(&key("c1ccccc1")).expect("get"),
            Some(b"<svg>benzene</svg>".to_vec())
        );
    }

    #[test]
    fn test_open_same_path_returns_same_handle() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let first = open_with(&dir, 100, 90);
        let second = open_with(&dir, 10, 5);

        assert!(Arc::ptr_eq(&first, &second));
        // The first open's limits stay in force.
        assert_eq!(second.limits(), StoreLimits::new(100, 90));
    }

    #[test]
    fn test_open_from_config_uses_molimages_subdir() {
        let (config, dir) = fixtures::temp_config();
        let store = LmdbArtifactStore::open(&config).expect("store should open");
        let expected = std::fs::canonicalize(dir.path().join("molimages")).expect("canonical");
        assert_eq!(store.path(), expected.as_path());
    }

    #[test]
    fn test_drop_trims_and_flushes() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = open_with(&dir, 3, 2);
            for n in 1..=5 {
                store.put(&key(&"C".repeat(n)), b"x").expect("put");
            }
            assert_eq!(store.len().expect("len"), 5);
        }

        let reopened = open_with(&dir, 3, 2);
        assert_eq!(reopened.len().expect("len"), 2);
        assert!(reopened.contains(&key("CCCCC")).expect("contains"));
        assert!(reopened.contains(&key("CCCC")).expect("contains"));
    }

    #[test]
    fn test_sequence_resumes_after_reopen() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = open_with(&dir, 10, 10);
            store.put(&key("C"), b"old").expect("put");
            store.put(&key("CC"), b"old").expect("put");
        }

        let store = open_with(&dir, 10, 10);
        store.put(&key("CCC"), b"new").expect("put");
        drop(store);

        let store = open_with(&dir, 2, 1);
        let outcome = store.trim_and_flush().expect("trim");
        assert_eq!(outcome.evicted, 2);
        assert!(store.contains(&key("CCC")).expect("contains"));
    }

    #[test]
    fn test_entry_encoding() {
        let k = key("CCO");
        let value = encode_entry(42, &k, b"payload");
        let entry = decode_entry(&value).expect("decode");
        assert_eq!(entry.seq, 42);
        assert_eq!(entry.store_key, k.as_bytes());
        assert_eq!(entry.bytes, b"payload");

        assert!(decode_entry(b"short").is_err());
        let mut truncated = encode_entry(1, &k, b"");
        truncated.truncate(HEADER_LEN + 1);
        assert!(decode_entry(&truncated).is_err());
    }

    #[test]
    fn test_lmdb_error_maps_to_store_error() {
        let err: MolvizError = LmdbStoreError::Transaction("boom".to_string()).into();
        assert_eq!(
            err,
            MolvizError::Store(StoreError::Transaction {
                reason: "boom".to_string()
            })
        );
    }
}
