//! molviz Test Utilities
//!
//! Shared test infrastructure for the molviz workspace:
//! - Mock render backends with call counting
//! - Proptest generators for keys and SMILES
//! - Fixtures for common molecules and configs
//! - Assertions for molviz error variants

pub use molviz_core::{
    CacheKey, ConfigError, MatchError, MolvizConfig, MolvizError, MolvizResult, RenderError,
    StoreError, StoreKey,
};
pub use molviz_render::{RenderBackend, RenderRequest};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// MOCK BACKENDS
// ============================================================================

/// Backend that renders a deterministic SVG per request and counts calls.
///
/// Clones share the call counter.
#[derive(Debug, Clone)]
pub struct CountingRenderer {
    name: String,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingRenderer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Sleep for `delay` inside every render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Handle to the call counter that outlives a boxed backend.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Bytes this backend produces for `request`.
    pub fn expected_bytes(&self, request: &RenderRequest) -> Vec<u8> {
        format!(
            "<svg data-backend=\"{}\">{}|{}|{}|{}|{}</svg>",
            self.name,
            request.structure,
            request.highlight.as_deref().unwrap_or(""),
            request.size,
            request.title,
            request.grayed_background
        )
        .into_bytes()
    }
}

#[async_trait]
impl RenderBackend for CountingRenderer {
    async fn render(&self, request: &RenderRequest) -> MolvizResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.expected_bytes(request))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Backend that always fails with `BackendFailed` and counts calls.
#[derive(Debug, Clone)]
pub struct FailingRenderer {
    message: String,
    calls: Arc<AtomicUsize>,
}

impl FailingRenderer {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderBackend for FailingRenderer {
    async fn render(&self, _request: &RenderRequest) -> MolvizResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MolvizError::Render(RenderError::BackendFailed {
            backend: "failing".to_string(),
            message: self.message.clone(),
        }))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Backend that fails until [`ToggleRenderer::recover`] is called, then
/// renders like a [`CountingRenderer`].
#[derive(Debug, Clone)]
pub struct ToggleRenderer {
    healthy: Arc<AtomicBool>,
    inner: CountingRenderer,
}

impl ToggleRenderer {
    pub fn failing() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(false)),
            inner: CountingRenderer::new("toggle"),
        }
    }

    pub fn recover(&self) {
        self.healthy.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.inner.calls()
    }
}

#[async_trait]
impl RenderBackend for ToggleRenderer {
    async fn render(&self, request: &RenderRequest) -> MolvizResult<Vec<u8>> {
        if self.healthy.load(Ordering::SeqCst) {
            return self.inner.render(request).await;
        }
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        Err(MolvizError::Render(RenderError::BackendFailed {
            backend: "toggle".to_string(),
            message: "backend offline".to_string(),
        }))
    }

    fn name(&self) -> &str {
        "toggle"
    }
}

/// Backend that never answers within any reasonable timeout.
#[derive(Debug, Clone, Default)]
pub struct HangingRenderer;

#[async_trait]
impl RenderBackend for HangingRenderer {
    async fn render(&self, _request: &RenderRequest) -> MolvizResult<Vec<u8>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for molviz inputs.

    use super::*;
    use proptest::prelude::*;

    /// Small valid SMILES built from aliphatic chains, optional branch and ring.
    pub fn arb_smiles() -> impl Strategy<Value = String> {
        prop_oneof![
            arb_chain(),
            (arb_chain(), arb_chain()).prop_map(|(a, b)| format!("{}({}){}", a, b, "C")),
            (3usize..7).prop_map(|n| format!("C1{}1", "C".repeat(n - 1))),
            Just("c1ccccc1".to_string()),
            Just("c1ccccc1O".to_string()),
        ]
    }

    /// Unbranched chain of C, N and O.
    pub fn arb_chain() -> impl Strategy<Value = String> {
        proptest::collection::vec(prop_oneof![Just("C"), Just("N"), Just("O")], 1..6)
            .prop_map(|atoms| atoms.concat())
    }

    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        (
            arb_smiles(),
            proptest::option::of(arb_chain()),
            prop_oneof![Just(100u32), Just(150u32), Just(200u32), 1u32..512],
            "[a-z ]{0,8}",
            any::<bool>(),
        )
            .prop_map(|(structure, highlight, size, title, grayed)| {
                CacheKey::new(structure, size)
                    .with_highlight(highlight.unwrap_or_default())
                    .with_title(title)
                    .with_grayed_background(grayed)
            })
    }

    /// Configs that pass validation, pointed at `cache_dir`.
    pub fn arb_valid_config(cache_dir: std::path::PathBuf) -> impl Strategy<Value = MolvizConfig> {
        (1usize..2000, 0.0f64..=1.0, 1u32..1024, 1u64..60_000).prop_map(
            move |(max_entries, ratio, default_size, timeout_ms)| MolvizConfig {
                cache_dir: cache_dir.clone(),
                max_entries,
                trim_target: ((max_entries as f64) * ratio) as usize,
                map_size_mb: 16,
                default_size,
                render_timeout: Duration::from_millis(timeout_ms),
                remote: None,
                match_memo_capacity: 0,
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use tempfile::TempDir;

    pub const BENZENE: &str = "c1ccccc1";
    pub const PHENOL: &str = "c1ccccc1O";
    pub const ETHANOL: &str = "CCO";
    pub const ETHYLAMINE: &str = "CCN";
    pub const TOLUENE: &str = "Cc1ccccc1";
    pub const ACETIC_ACID: &str = "CC(=O)O";

    /// Structures that do not parse.
    pub const INVALID_SMILES: [&str; 3] = ["C1CC", "C((C", "[Xx]"];

    /// Small config rooted in a fresh temporary directory. Keep the `TempDir`
    /// alive for as long as the store is in use.
    pub fn temp_config() -> (MolvizConfig, TempDir) {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let config = MolvizConfig {
            cache_dir: dir.path().to_path_buf(),
            map_size_mb: 16,
            render_timeout: Duration::from_secs(5),
            ..MolvizConfig::default()
        };
        (config, dir)
    }

    /// Same as [`temp_config`] with tighter store limits.
    pub fn temp_config_with_limits(max_entries: usize, trim_target: usize) -> (MolvizConfig, TempDir) {
        let (config, dir) = temp_config();
        (
            MolvizConfig {
                max_entries,
                trim_target,
                ..config
            },
            dir,
        )
    }

    /// Key for `structure` at the default size with no decoration.
    pub fn plain_key(structure: &str) -> CacheKey {
        CacheKey::new(structure, molviz_core::DEFAULT_RENDER_SIZE)
    }

    /// Distinct keys `C`, `CC`, `CCC`, ... for filling a store.
    pub fn numbered_keys(count: usize) -> Vec<CacheKey> {
        (1..=count).map(|n| plain_key(&"C".repeat(n))).collect()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for molviz error variants.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &MolvizResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &MolvizResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_store_error<T: std::fmt::Debug>(result: &MolvizResult<T>) {
        match result {
            Err(MolvizError::Store(_)) => {}
            other => panic!("Expected Store error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_render_error<T: std::fmt::Debug>(result: &MolvizResult<T>) {
        match result {
            Err(MolvizError::Render(_)) => {}
            other => panic!("Expected Render error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &MolvizResult<T>) {
        match result {
            Err(MolvizError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that `bytes` is an SVG document.
    #[track_caller]
    pub fn assert_svg(bytes: &[u8]) {
        let text = std::str::from_utf8(bytes).expect("artifact should be UTF-8");
        assert!(text.contains("<svg"), "Expected SVG markup, got: {}", text);
    }

    #[track_caller]
    pub fn assert_config_valid(config: &MolvizConfig) {
        assert!(
            config.validate().is_ok(),
            "Config validation failed: {:?}",
            config.validate()
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
