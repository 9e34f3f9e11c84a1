//! molviz Storage - Artifact Stores and Rendering Cache
//!
//! The durable LMDB artifact store (one handle per location per process), an
//! in-memory fallback with the same semantics, and the [`RenderingCache`] that
//! turns a [`CacheKey`](molviz_core::CacheKey) into image bytes.

pub mod cache;

pub use cache::{
    Artifact, ArtifactSource, ArtifactStore, CacheStats, LmdbArtifactStore, LmdbStoreError,
    MemoryArtifactStore, RenderingCache, StoreLimits, TrimOutcome, DEFAULT_RENDER_TIMEOUT,
};
