//! In-process artifact store.
//!
//! Same eviction semantics as the LMDB store, nothing survives the process.
//! Used when the durable store cannot be opened, and in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use molviz_core::{MolvizError, MolvizResult, StoreError, StoreKey};

use super::traits::{ArtifactStore, StoreLimits, TrimOutcome};

#[derive(Debug, Default)]
struct MemoryState {
    /// store key -> (insertion seq, bytes)
    entries: HashMap<StoreKey, (u64, Vec<u8>)>,
    next_seq: u64,
}

/// Volatile [`ArtifactStore`].
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    state: Mutex<MemoryState>,
    limits: StoreLimits,
}

impl MemoryArtifactStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            limits,
        }
    }

    fn state(&self) -> MolvizResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| MolvizError::Store(StoreError::LockPoisoned))
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn get(&self, key: &StoreKey) -> MolvizResult<Option<Vec<u8>>> {
        Ok(self.state()?.entries.get(key).map(|(_, bytes)| bytes.clone()))
    }

    fn put(&self, key: &StoreKey, bytes: &[u8]) -> MolvizResult<()> {
        let mut state = self.state()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(key.clone(), (seq, bytes.to_vec()));
        Ok(())
    }

    fn contains(&self, key: &StoreKey) -> MolvizResult<bool> {
        Ok(self.state()?.entries.contains_key(key))
    }

    fn len(&self) -> MolvizResult<u64> {
        Ok(self.state()?.entries.len() as u64)
    }

    fn trim_and_flush(&self) -> MolvizResult<TrimOutcome> {
        let mut state = self.state()?;
        let len = state.entries.len() as u64;
        let excess = self.limits.excess(len);

        if excess > 0 {
            let mut order: Vec<(u64, StoreKey)> = state
                .entries
                .iter()
                .map(|(key, (seq, _))| (*seq, key.clone()))
                .collect();
            order.sort_unstable_by_key(|(seq, _)| *seq);
            for (_, key) in order.into_iter().take(excess as usize) {
                state.entries.remove(&key);
            }
            tracing::debug!(evicted = excess, remaining = len - excess, "Trimmed memory store");
        }

        Ok(TrimOutcome {
            evicted: excess,
            remaining: state.entries.len() as u64,
        })
    }

    fn limits(&self) -> StoreLimits {
        self.limits
    }

    fn name(&self) -> &str {
        "memory"
    }
}
