//! molviz-render - Render Backends
//!
//! Backend-agnostic rendering interface. A backend turns a [`RenderRequest`]
//! into image bytes; the cache decides when to call it and what to do when it
//! fails. Backends must be explicitly registered - no auto-discovery.

pub mod error_svg;
pub mod providers;

use async_trait::async_trait;
use molviz_core::{CacheKey, MolvizConfig, MolvizResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use error_svg::{error_artifact, ERROR_SVG_HEIGHT, ERROR_SVG_WIDTH};
pub use providers::RemoteRenderer;

// ============================================================================
// RENDER REQUEST
// ============================================================================

/// Everything a backend needs to draw one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub structure: String,
    /// Substructure to highlight, `None` for a plain drawing.
    pub highlight: Option<String>,
    pub size: u32,
    pub title: String,
    pub grayed_background: bool,
}

impl From<&CacheKey> for RenderRequest {
    fn from(key: &CacheKey) -> Self {
        Self {
            structure: key.structure().to_string(),
            highlight: key.highlight_opt().map(str::to_string),
            size: key.size(),
            title: key.title().to_string(),
            grayed_background: key.grayed_background(),
        }
    }
}

// ============================================================================
// RENDER BACKEND TRAIT
// ============================================================================

/// A producer of rendering artifacts.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Render one request.
    ///
    /// # Returns
    /// * `Ok(Vec<u8>)` - Artifact bytes (SVG markup in practice)
    /// * `Err(MolvizError::Render)` - If rendering fails
    async fn render(&self, request: &RenderRequest) -> MolvizResult<Vec<u8>>;

    /// Short identifier used in logs and error messages.
    fn name(&self) -> &str;
}

// ============================================================================
// RENDERER REGISTRY
// ============================================================================

/// Local and remote backend slots.
///
/// The cache renders with the local backend when one is registered and with
/// the remote one otherwise. A failed local render does not fall through.
///
/// # Example
/// ```ignore
/// let mut registry = RendererRegistry::new();
/// registry.register_remote(Box::new(RemoteRenderer::new("http://render.example.org/drawMol")?));
/// ```
pub struct RendererRegistry {
    local: Option<Arc<dyn RenderBackend>>,
    remote: Option<Arc<dyn RenderBackend>>,
}

impl RendererRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            local: None,
            remote: None,
        }
    }

    /// Registry with the remote renderer from `config.remote`, if any.
    pub fn from_config(config: &MolvizConfig) -> MolvizResult<Self> {
        let mut registry = Self::new();
        if let Some(remote) = &config.remote {
            registry.register_remote(Box::new(RemoteRenderer::from_config(remote)?));
        }
        Ok(registry)
    }

    /// Register the local backend, replacing any previous one.
    pub fn register_local(&mut self, backend: Box<dyn RenderBackend>) {
        self.local = Some(Arc::from(backend));
    }

    /// Register the remote backend, replacing any previous one.
    pub fn register_remote(&mut self, backend: Box<dyn RenderBackend>) {
        self.remote = Some(Arc::from(backend));
    }

    pub fn local(&self) -> Option<Arc<dyn RenderBackend>> {
        self.local.clone()
    }

    pub fn remote(&self) -> Option<Arc<dyn RenderBackend>> {
        self.remote.clone()
    }

    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn clear_local(&mut self) {
        self.local = None;
    }

    pub fn clear_remote(&mut self) {
        self.remote = None;
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("local", &self.local.as_ref().map(|b| b.name().to_string()))
            .field("remote", &self.remote.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}
