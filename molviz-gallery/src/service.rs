//! Gallery operations: planning keys, rendering a page, selection and commit.

use std::collections::HashSet;
use std::sync::Arc;

use molviz_core::{CacheKey, MatchError, MolvizConfig, MolvizResult};
use molviz_match::{GraphMatcher, MatchEngine, SubstructureMatcher};
use molviz_render::RendererRegistry;
use molviz_storage::{
    Artifact, ArtifactSource, ArtifactStore, LmdbArtifactStore, MemoryArtifactStore,
    RenderingCache, StoreLimits, TrimOutcome,
};

use crate::entry::GalleryEntry;

/// Where the artifacts of one [`GalleryService::render_all`] call came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub total: usize,
    pub from_cache: usize,
    pub rendered: usize,
    pub failed: usize,
}

impl RenderSummary {
    fn record(&mut self, source: ArtifactSource) {
        self.total += 1;
        match source {
            ArtifactSource::Cache => self.from_cache += 1,
            ArtifactSource::Local | ArtifactSource::Remote => self.rendered += 1,
            ArtifactSource::Error => self.failed += 1,
        }
    }
}

/// Artifacts in request order plus their summary.
#[derive(Debug, Clone)]
pub struct GalleryRender {
    pub artifacts: Vec<Artifact>,
    pub summary: RenderSummary,
}

/// Front-end operations over a shared [`RenderingCache`] and a [`MatchEngine`].
pub struct GalleryService<M = GraphMatcher> {
    cache: Arc<RenderingCache>,
    engine: MatchEngine<M>,
    size: u32,
}

impl GalleryService<GraphMatcher> {
    /// Service over the durable store. Fails if the store cannot be opened.
    pub fn open(config: &MolvizConfig, renderers: RendererRegistry) -> MolvizResult<Self> {
        let cache = RenderingCache::from_config(config, renderers)?;
        Ok(Self::new(
            Arc::new(cache),
            MatchEngine::from_config(config),
            config.default_size,
        ))
    }

    /// Like [`open`](Self::open), but falls back to an in-memory store when
    /// the durable one is unavailable. Only an invalid config is an error.
    pub fn open_or_memory(config: &MolvizConfig, renderers: RendererRegistry) -> MolvizResult<Self> {
        config.validate()?;

        let store: Arc<dyn ArtifactStore> = match LmdbArtifactStore::open(config) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(
                    path = %config.store_path().display(),
                    error = %e,
                    "Artifact store unavailable, using in-memory store"
                );
                Arc::new(MemoryArtifactStore::new(StoreLimits::from_config(config)))
            }
        };

        let cache = RenderingCache::new(store, renderers).with_render_timeout(config.render_timeout);
        Ok(Self::new(
            Arc::new(cache),
            MatchEngine::from_config(config),
            config.default_size,
        ))
    }
}

impl<M: SubstructureMatcher> GalleryService<M> {
    pub fn new(cache: Arc<RenderingCache>, engine: MatchEngine<M>, size: u32) -> Self {
        Self {
            cache,
            engine,
            size,
        }
    }

    pub fn cache(&self) -> &Arc<RenderingCache> {
        &self.cache
    }

    pub fn engine(&self) -> &MatchEngine<M> {
        &self.engine
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Change the thumbnail size used by subsequent plans.
    pub fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    /// Keys for the molecule view.
    ///
    /// With a non-empty `highlight`, only molecules that contain it are drawn
    /// highlighted; the rest, and unparseable molecules, are drawn plain.
    /// Subset members get the grayed background. An unparseable highlight is
    /// an error.
    pub fn plan_molecule_keys(
        &self,
        entries: &[GalleryEntry],
        highlight: Option<&str>,
    ) -> Result<Vec<CacheKey>, MatchError> {
        let highlight = highlight.filter(|h| !h.is_empty());
        let structures: Vec<&str> = entries.iter().map(|e| e.structure.as_str()).collect();

        let matched = match highlight {
            Some(fragment) => self.engine.select_matching(&[fragment], &structures)?,
            None => Default::default(),
        };

        let keys: Vec<CacheKey> = entries
            .iter()
            .map(|entry| {
                let key = CacheKey::new(entry.structure.as_str(), self.size)
                    .with_title(entry.title.as_str())
                    .with_grayed_background(entry.in_subset);
                match highlight {
                    Some(fragment) if matched.contains(&entry.structure) => key.with_highlight(fragment),
                    _ => key,
                }
            })
            .collect();

        tracing::debug!(
            entries = keys.len(),
            highlighted = matched.len(),
            highlight = ?highlight,
            "Planned molecule keys"
        );
        Ok(keys)
    }

    /// Keys for the fragment view: every non-empty fragment, drawn plain.
    pub fn plan_fragment_keys<F: AsRef<str>>(&self, fragments: &[F]) -> Vec<CacheKey> {
        fragments
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| !f.is_empty())
            .map(|f| CacheKey::new(f, self.size))
            .collect()
    }

    /// Fetch every key in order.
    pub async fn render_all(&self, keys: &[CacheKey]) -> GalleryRender {
        let mut summary = RenderSummary::default();
        let mut artifacts = Vec::with_capacity(keys.len());

        for key in keys {
            let artifact = self.cache.fetch(key).await;
            summary.record(artifact.source());
            artifacts.push(artifact);
        }

        if summary.failed > 0 {
            tracing::warn!(
                total = summary.total,
                failed = summary.failed,
                "Some artifacts could not be rendered"
            );
        } else {
            tracing::debug!(
                total = summary.total,
                from_cache = summary.from_cache,
                rendered = summary.rendered,
                "Rendered gallery"
            );
        }

        GalleryRender { artifacts, summary }
    }

    /// Selection flags for the displayed molecules: `true` where the molecule
    /// contains `fragment`. An empty fragment selects nothing.
    pub fn select_marked<S: AsRef<str>>(
        &self,
        structures: &[S],
        fragment: &str,
    ) -> Result<Vec<bool>, MatchError> {
        if fragment.is_empty() {
            return Ok(vec![false; structures.len()]);
        }
        let matched = self.engine.select_matching(&[fragment], structures)?;
        Ok(structures
            .iter()
            .map(|s| matched.contains(s.as_ref()))
            .collect())
    }

    /// Commit in fragment view: molecules, in input order, that contain at
    /// least one of the selected fragments.
    pub fn commit_fragments<F, S>(
        &self,
        selected_fragments: &[F],
        molecules: &[S],
    ) -> Result<Vec<String>, MatchError>
    where
        F: AsRef<str>,
        S: AsRef<str>,
    {
        if selected_fragments.is_empty() {
            return Ok(Vec::new());
        }
        self.engine.filter_matching(selected_fragments, molecules)
    }

    /// Commit in molecule view: molecules, in input order, whose structure is
    /// among the selected ones.
    pub fn commit_molecules<S, T>(&self, molecules: &[S], selected: &[T]) -> Vec<String>
    where
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let selected: HashSet<&str> = selected.iter().map(|s| s.as_ref()).collect();
        molecules
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| selected.contains(m))
            .map(str::to_string)
            .collect()
    }

    /// Persist the cache: trim it to size and flush to disk.
    pub async fn sync(&self) -> MolvizResult<TrimOutcome> {
        self.cache.sync().await
    }
}

impl<M> std::fmt::Debug for GalleryService<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryService")
            .field("cache", &self.cache)
            .field("size", &self.size)
            .finish()
    }
}
