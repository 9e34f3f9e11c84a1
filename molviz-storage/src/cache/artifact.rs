//! The result of a cache fetch.

use molviz_render::error_artifact;

/// Where the bytes of an [`Artifact`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactSource {
    /// Read from the store.
    Cache,
    /// Rendered by the local backend.
    Local,
    /// Rendered by the remote backend.
    Remote,
    /// Rendering failed; the bytes are an error placeholder and were not stored.
    Error,
}

/// Artifact bytes plus their provenance.
///
/// A fetch never fails outright: when rendering fails the caller gets an error
/// placeholder SVG and can tell it apart with [`Artifact::is_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    bytes: Vec<u8>,
    source: ArtifactSource,
}

impl Artifact {
    /// Artifact served from the store.
    pub fn from_cache(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            source: ArtifactSource::Cache,
        }
    }

    /// Freshly rendered artifact.
    pub fn rendered(bytes: Vec<u8>, source: ArtifactSource) -> Self {
        Self { bytes, source }
    }

    /// Error placeholder displaying `message`.
    pub fn error(message: &str) -> Self {
        Self {
            bytes: error_artifact(message),
            source: ArtifactSource::Error,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn source(&self) -> ArtifactSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ArtifactSource::Cache
    }

    pub fn is_error(&self) -> bool {
        self.source == ArtifactSource::Error
    }
}

impl AsRef<[u8]> for Artifact {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_flags() {
        let artifact = Artifact::from_cache(b"<svg/>".to_vec());
        assert!(artifact.was_cache_hit());
        assert!(!artifact.is_error());
        assert_eq!(artifact.bytes(), b"<svg/>");
    }

    #[test]
    fn test_error_artifact_carries_message() {
        let artifact = Artifact::error("wrong SMILES notation");
        assert!(artifact.is_error());
        assert!(!artifact.was_cache_hit());
        let text = String::from_utf8(artifact.into_bytes()).expect("utf8");
        assert!(text.contains("wrong SMILES notation"));
        assert!(text.contains("<svg"));
    }
}
