//! Read-through rendering cache.
//!
//! Lookup, render and write happen under one cache-wide lock, so two
//! concurrent fetches of the same missing key cause a single backend call.
//! Helpers take the already-locked [`CacheState`]; nothing re-acquires the
//! lock while holding it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use molviz_core::{CacheKey, MolvizConfig, MolvizError, MolvizResult, RenderError, StoreKey};
use molviz_render::{RenderBackend, RenderRequest, RendererRegistry};
use tokio::sync::Mutex;

use super::artifact::{Artifact, ArtifactSource};
use super::lmdb_backend::LmdbArtifactStore;
use super::traits::{ArtifactStore, CacheStats, TrimOutcome};

/// Render timeout used by [`RenderingCache::new`].
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

const INVALID_STRUCTURE_MESSAGE: &str = "wrong SMILES notation";

struct CacheState {
    store: Arc<dyn ArtifactStore>,
    renderers: RendererRegistry,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    renders: AtomicU64,
    failures: AtomicU64,
    store_errors: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            renders: self.renders.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Memoizes rendered artifacts by [`CacheKey`].
///
/// Share one instance via `Arc`. [`fetch`](Self::fetch) never fails: store
/// malfunctions are logged and counted, render failures become error
/// artifacts that are never stored.
///
/// # Example
///
/// ```ignore
/// let cache = RenderingCache::from_config(&config, RendererRegistry::from_config(&config)?)?;
/// let artifact = cache.fetch(&CacheKey::new("c1ccccc1O", 200)).await;
/// if artifact.is_error() {
///     tracing::warn!("showing placeholder");
/// }
/// ```
pub struct RenderingCache {
    state: Mutex<CacheState>,
    counters: Counters,
    render_timeout: Duration,
}

impl RenderingCache {
    pub fn new(store: Arc<dyn ArtifactStore>, renderers: RendererRegistry) -> Self {
        Self {
            state: Mutex::new(CacheState { store, renderers }),
            counters: Counters::default(),
            render_timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    /// Bound every backend call by `timeout`.
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Cache over the durable store at `config.store_path()`.
    pub fn from_config(config: &MolvizConfig, renderers: RendererRegistry) -> MolvizResult<Self> {
        config.validate()?;
        let store: Arc<dyn ArtifactStore> = LmdbArtifactStore::open(config)?;
        Ok(Self::new(store, renderers).with_render_timeout(config.render_timeout))
    }

    pub fn render_timeout(&self) -> Duration {
        self.render_timeout
    }

    /// Return the artifact for `key`, rendering and storing it on a miss.
    pub async fn fetch(&self, key: &CacheKey) -> Artifact {
        let store_key = key.store_key();
        let state = self.state.lock().await;

        if let Some(bytes) = self.lookup(&state, &store_key, key) {
            Counters::bump(&self.counters.hits);
            tracing::trace!(structure = %key.structure(), size = key.size(), "Cache hit");
            return Artifact::from_cache(bytes);
        }
        Counters::bump(&self.counters.misses);

        match self.render(&state, key).await {
            Ok((bytes, source)) => {
                Counters::bump(&self.counters.renders);
                self.persist(&state, &store_key, key, &bytes);
                Artifact::rendered(bytes, source)
            }
            Err(err) => {
                Counters::bump(&self.counters.failures);
                tracing::warn!(structure = %key.structure(), error = %err, "Rendering failed");
                Artifact::error(&failure_message(&err))
            }
        }
    }

    /// Whether an artifact for `key` is stored. A store error reads as absent.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        let state = self.state.lock().await;
        match state.store.contains(&key.store_key()) {
            Ok(present) => present,
            Err(e) => {
                Counters::bump(&self.counters.store_errors);
                tracing::error!(store = state.store.name(), error = %e, "Store presence check failed");
                false
            }
        }
    }

    /// Trim the store to its target size and flush it to disk.
    pub async fn sync(&self) -> MolvizResult<TrimOutcome> {
        let state = self.state.lock().await;
        let outcome = state.store.trim_and_flush()?;
        self.counters
            .evictions
            .fetch_add(outcome.evicted, Ordering::Relaxed);
        tracing::debug!(
            store = state.store.name(),
            evicted = outcome.evicted,
            remaining = outcome.remaining,
            "Synced artifact store"
        );
        Ok(outcome)
    }

    /// Number of stored artifacts.
    pub async fn len(&self) -> MolvizResult<u64> {
        self.state.lock().await.store.len()
    }

    pub async fn is_empty(&self) -> MolvizResult<bool> {
        Ok(self.len().await? == 0)
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Replace the local backend. Subsequent misses render locally.
    pub async fn register_local(&self, backend: Box<dyn RenderBackend>) {
        self.state.lock().await.renderers.register_local(backend);
    }

    /// Replace the remote backend.
    pub async fn register_remote(&self, backend: Box<dyn RenderBackend>) {
        self.state.lock().await.renderers.register_remote(backend);
    }

    /// Drop the local backend so misses go to the remote one.
    pub async fn clear_local(&self) {
        self.state.lock().await.renderers.clear_local();
    }

    fn lookup(&self, state: &CacheState, store_key: &StoreKey, key: &CacheKey) -> Option<Vec<u8>> {
        match state.store.get(store_key) {
            Ok(found) => found,
            Err(e) => {
                Counters::bump(&self.counters.store_errors);
                tracing::error!(
                    store = state.store.name(),
                    structure = %key.structure(),
                    error = %e,
                    "Store read failed, rendering instead"
                );
                None
            }
        }
    }

    fn persist(&self, state: &CacheState, store_key: &StoreKey, key: &CacheKey, bytes: &[u8]) {
        if let Err(e) = state.store.put(store_key, bytes) {
            Counters::bump(&self.counters.store_errors);
            tracing::error!(
                store = state.store.name(),
                structure = %key.structure(),
                error = %e,
                "Store write failed"
            );
        }
    }

    async fn render(
        &self,
        state: &CacheState,
        key: &CacheKey,
    ) -> MolvizResult<(Vec<u8>, ArtifactSource)> {
        let (backend, source) = match (state.renderers.local(), state.renderers.remote()) {
            (Some(local), _) => (local, ArtifactSource::Local),
            (None, Some(remote)) => (remote, ArtifactSource::Remote),
            (None, None) => return Err(MolvizError::Render(RenderError::NoBackend)),
        };

        let request = RenderRequest::from(key);
        tracing::debug!(
            backend = backend.name(),
            structure = %request.structure,
            highlight = ?request.highlight,
            size = request.size,
            "Rendering artifact"
        );

        match tokio::time::timeout(self.render_timeout, backend.render(&request)).await {
            Ok(result) => result.map(|bytes| (bytes, source)),
            Err(_) => Err(MolvizError::Render(RenderError::Timeout {
                backend: backend.name().to_string(),
                timeout: self.render_timeout,
            })),
        }
    }
}

impl std::fmt::Debug for RenderingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderingCache")
            .field("render_timeout", &self.render_timeout)
            .field("stats", &self.stats())
            .finish()
    }
}

fn failure_message(err: &MolvizError) -> String {
    match err {
        MolvizError::Render(RenderError::InvalidStructure { .. }) => {
            INVALID_STRUCTURE_MESSAGE.to_string()
        }
        MolvizError::Render(inner) => format!("Error loading: {}", inner),
        other => format!("Error loading: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_backend::MemoryArtifactStore;
    use crate::cache::traits::StoreLimits;
    use molviz_core::StoreError;
    use molviz_render::RemoteRenderer;
    use molviz_test_utils::{
        fixtures, CountingRenderer, FailingRenderer, HangingRenderer, ToggleRenderer,
    };
    use std::sync::atomic::AtomicUsize;

    /// Memory store that counts writes.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryArtifactStore,
        puts: AtomicUsize,
    }

    impl ArtifactStore for RecordingStore {
        fn get(&self, key: &StoreKey) -> MolvizResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }
        fn put(&self, key: &StoreKey, bytes: &[u8]) -> MolvizResult<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, bytes)
        }
        fn contains(&self, key: &StoreKey) -> MolvizResult<bool> {
            self.inner.contains(key)
        }
        fn len(&self) -> MolvizResult<u64> {
            self.inner.len()
        }
        fn trim_and_flush(&self) -> MolvizResult<TrimOutcome> {
            self.inner.trim_and_flush()
        }
        fn limits(&self) -> StoreLimits {
            self.inner.limits()
        }
        fn name(&self) -> &str {
            "recording"
        }
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    impl BrokenStore {
        fn fail<T>() -> MolvizResult<T> {
            Err(MolvizError::Store(StoreError::Transaction {
                reason: "disk on fire".to_string(),
            }))
        }
    }

    impl ArtifactStore for BrokenStore {
        fn get(&self, _key: &StoreKey) -> MolvizResult<Option<Vec<u8>>> {
            Self::fail()
        }
        fn put(&self, _key: &StoreKey, _bytes: &[u8]) -> MolvizResult<()> {
            Self::fail()
        }
        fn contains(&self, _key: &StoreKey) -> MolvizResult<bool> {
            Self::fail()
        }
        fn len(&self) -> MolvizResult<u64> {
            Self::fail()
        }
        fn trim_and_flush(&self) -> MolvizResult<TrimOutcome> {
            Self::fail()
        }
        fn limits(&self) -> StoreLimits {
            StoreLimits::default()
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    fn local_registry(backend: impl RenderBackend + 'static) -> RendererRegistry {
        let mut registry = RendererRegistry::new();
        registry.register_local(Box::new(backend));
        registry
    }

    fn memory_cache(registry: RendererRegistry) -> RenderingCache {
        RenderingCache::new(Arc::new(MemoryArtifactStore::default()), registry)
    }

    fn text(artifact: &Artifact) -> String {
        String::from_utf8(artifact.bytes().to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent() {
        let renderer = CountingRenderer::new("local");
        let cache = memory_cache(local_registry(renderer.clone()));
        let key = CacheKey::new(fixtures::PHENOL, 150).with_highlight(fixtures::BENZENE);

        let first = cache.fetch(&key).await;
        let second = cache.fetch(&key).await;

        assert_eq!(first.source(), ArtifactSource::Local);
        assert!(second.was_cache_hit());
        assert_eq!(first.bytes(), second.bytes());
        assert_eq!(first.bytes(), renderer.expected_bytes(&RenderRequest::from(&key)).as_slice());
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_one_write_per_miss() {
        let store = Arc::new(RecordingStore::default());
        let cache = RenderingCache::new(store.clone(), local_registry(CountingRenderer::new("local")));

        let key = fixtures::plain_key(fixtures::ETHANOL);
        cache.fetch(&key).await;
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);

        cache.fetch(&key).await;
        cache.fetch(&key).await;
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);

        cache.fetch(&fixtures::plain_key(fixtures::TOLUENE)).await;
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_stored_and_retried() {
        let toggle = ToggleRenderer::failing();
        let store = Arc::new(RecordingStore::default());
        let cache = RenderingCache::new(store.clone(), local_registry(toggle.clone()));
        let key = fixtures::plain_key(fixtures::BENZENE);

        let failed = cache.fetch(&key).await;
        assert!(failed.is_error());
        assert!(text(&failed).contains("Error loading"));
        assert!(!cache.contains(&key).await);
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);

        toggle.recover();
        let recovered = cache.fetch(&key).await;
        assert_eq!(recovered.source(), ArtifactSource::Local);
        assert!(cache.contains(&key).await);

        let cached = cache.fetch(&key).await;
        assert!(cached.was_cache_hit());
        assert_eq!(toggle.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_backend_yields_error_artifact() {
        let cache = memory_cache(RendererRegistry::new());
        let artifact = cache.fetch(&fixtures::plain_key(fixtures::ETHANOL)).await;

        assert!(artifact.is_error());
        assert!(text(&artifact).contains("No render backend available"));
        assert_eq!(cache.stats().failures, 1);
        assert!(cache.is_empty().await.expect("is_empty"));
    }

    #[tokio::test]
    async fn test_invalid_structure_shows_wrong_notation() {
        let mut registry = RendererRegistry::new();
        registry.register_remote(Box::new(
            RemoteRenderer::new("http://127.0.0.1:9/drawMol").expect("client"),
        ));
        let cache = memory_cache(registry);

        let artifact = cache.fetch(&fixtures::plain_key("C1CC(")).await;
        assert!(artifact.is_error());
        assert!(text(&artifact).contains("wrong SMILES notation"));
        assert!(!text(&artifact).contains("Error loading"));
    }

    #[tokio::test]
    async fn test_render_timeout_is_a_failure() {
        let cache = memory_cache(local_registry(HangingRenderer))
            .with_render_timeout(Duration::from_millis(50));
        let key = fixtures::plain_key(fixtures::ETHANOL);

        let artifact = cache.fetch(&key).await;
        assert!(artifact.is_error());
        assert!(text(&artifact).contains("timed out"));
        assert!(!cache.contains(&key).await);
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_local_preferred_over_remote() {
        let local = CountingRenderer::new("local");
        let remote = CountingRenderer::new("remote");
        let mut registry = RendererRegistry::new();
        registry.register_local(Box::new(local.clone()));
        registry.register_remote(Box::new(remote.clone()));
        let cache = memory_cache(registry);

        let artifact = cache.fetch(&fixtures::plain_key(fixtures::TOLUENE)).await;
        assert_eq!(artifact.source(), ArtifactSource::Local);
        assert_eq!(local.calls(), 1);
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_local_failure_does_not_fall_back() {
        let local = FailingRenderer::new("no drawing toolkit");
        let remote = CountingRenderer::new("remote");
        let mut registry = RendererRegistry::new();
        registry.register_local(Box::new(local.clone()));
        registry.register_remote(Box::new(remote.clone()));
        let cache = memory_cache(registry);

        let artifact = cache.fetch(&fixtures::plain_key(fixtures::TOLUENE)).await;
        assert!(artifact.is_error());
        assert!(text(&artifact).contains("no drawing toolkit"));
        assert_eq!(local.calls(), 1);
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_used_after_clearing_local() {
        let remote = CountingRenderer::new("remote");
        let mut registry = local_registry(CountingRenderer::new("local"));
        registry.register_remote(Box::new(remote.clone()));
        let cache = memory_cache(registry);

        cache.clear_local().await;
        let artifact = cache.fetch(&fixtures::plain_key(fixtures::ACETIC_ACID)).await;
        assert_eq!(artifact.source(), ArtifactSource::Remote);
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetches_render_once() {
        let renderer = CountingRenderer::new("local").with_delay(Duration::from_millis(50));
        let cache = Arc::new(memory_cache(local_registry(renderer.clone())));
        let key = CacheKey::new(fixtures::PHENOL, 200).with_title("phenol");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                tokio::spawn(async move { cache.fetch(&key).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.expect("task should not panic"));
        }

        assert_eq!(renderer.calls(), 1);
        assert!(results.iter().all(|a| a.bytes() == results[0].bytes()));
        assert_eq!(results.iter().filter(|a| a.was_cache_hit()).count(), 7);
    }

    #[tokio::test]
    async fn test_store_errors_are_counted_not_fatal() {
        let renderer = CountingRenderer::new("local");
        let cache = RenderingCache::new(Arc::new(BrokenStore), local_registry(renderer.clone()));
        let key = fixtures::plain_key(fixtures::ETHYLAMINE);

        let artifact = cache.fetch(&key).await;
        assert_eq!(artifact.source(), ArtifactSource::Local);
        assert!(!artifact.is_error());

        // Nothing could be stored, so the next fetch renders again.
        cache.fetch(&key).await;
        assert_eq!(renderer.calls(), 2);

        let stats = cache.stats();
        assert_eq!(stats.store_errors, 4);
        assert_eq!(stats.renders, 2);
        assert!(cache.sync().await.is_err());
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = memory_cache(local_registry(CountingRenderer::new("local")));
        let key = fixtures::plain_key(fixtures::BENZENE);

        cache.fetch(&key).await;
        cache.fetch(&key).await;
        cache.fetch(&key).await;

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.renders, 1);
        assert_eq!(stats.failures, 0);
    }

    #[tokio::test]
    async fn test_sync_trims_durable_store() {
        let (config, _dir) = fixtures::temp_config_with_limits(3, 2);
        let cache = RenderingCache::from_config(&config, local_registry(CountingRenderer::new("local")))
            .expect("cache should open");

        for key in fixtures::numbered_keys(5) {
            cache.fetch(&key).await;
        }
        assert_eq!(cache.len().await.expect("len"), 5);

        let outcome = cache.sync().await.expect("sync");
        assert_eq!(outcome, TrimOutcome { evicted: 3, remaining: 2 });
        assert_eq!(cache.stats().evictions, 3);
        assert_eq!(cache.len().await.expect("len"), 2);
    }

    #[tokio::test]
    async fn test_artifacts_survive_cache_restart() {
        let (config, _dir) = fixtures::temp_config();
        let key = CacheKey::new(fixtures::TOLUENE, 120).with_grayed_background(true);

        {
            let cache = RenderingCache::from_config(&config, local_registry(CountingRenderer::new("local")))
                .expect("cache should open");
            assert_eq!(cache.fetch(&key).await.source(), ArtifactSource::Local);
        }

        let failing = FailingRenderer::new("should not be called");
        let cache = RenderingCache::from_config(&config, local_registry(failing.clone()))
            .expect("cache should reopen");
        assert!(cache.fetch(&key).await.was_cache_hit());
        assert_eq!(failing.calls(), 0);
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let (config, _dir) = fixtures::temp_config();
        let config = MolvizConfig {
            max_entries: 0,
            ..config
        };
        assert!(RenderingCache::from_config(&config, RendererRegistry::new()).is_err());
    }
}
