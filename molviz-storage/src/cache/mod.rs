//! Artifact stores and the rendering cache built on them.
//!
//! [`ArtifactStore`] is the persistent map from store key to artifact bytes,
//! with oldest-first trimming. [`RenderingCache`] sits in front of a store and
//! a [`RendererRegistry`](molviz_render::RendererRegistry), rendering and
//! recording artifacts on a miss.
//!
//! # Example
//!
//! ```ignore
//! let cache = RenderingCache::from_config(&config, registry)?;
//! let artifact = cache.fetch(&CacheKey::new("CCO", 200)).await;
//! cache.sync().await?;
//! ```

pub mod artifact;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod rendering;
pub mod traits;

pub use artifact::{Artifact, ArtifactSource};
pub use lmdb_backend::{LmdbArtifactStore, LmdbStoreError};
pub use memory_backend::MemoryArtifactStore;
pub use rendering::{RenderingCache, DEFAULT_RENDER_TIMEOUT};
pub use traits::{ArtifactStore, CacheStats, StoreLimits, TrimOutcome};
