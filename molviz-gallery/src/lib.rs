//! molviz Gallery - Front-End Operations
//!
//! Composes the [`RenderingCache`](molviz_storage::RenderingCache) and the
//! [`MatchEngine`](molviz_match::MatchEngine) into what a thumbnail gallery
//! needs: decide which molecules get a highlighted drawing, render a page of
//! keys, select the molecules containing a fragment, commit a selection, and
//! sync the store on save.
//!
//! # Example
//!
//! ```ignore
//! let gallery = GalleryService::open_or_memory(&config, RendererRegistry::from_config(&config)?)?;
//! let keys = gallery.plan_molecule_keys(&entries, Some("c1ccccc1"))?;
//! let page = gallery.render_all(&keys).await;
//! gallery.sync().await?;
//! ```

pub mod entry;
pub mod service;

pub use entry::{mark_subset, GalleryEntry, TITLE_SEPARATOR};
pub use service::{GalleryRender, GalleryService, RenderSummary};
