//! Gallery rows.

use std::collections::HashSet;

/// Separator between title parts.
pub const TITLE_SEPARATOR: &str = " / ";

/// One molecule shown in the gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub structure: String,
    pub title: String,
    /// Drawn with the grayed background.
    pub in_subset: bool,
}

impl GalleryEntry {
    pub fn new(structure: impl Into<String>) -> Self {
        Self {
            structure: structure.into(),
            title: String::new(),
            in_subset: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Title made of several attribute values, joined with [`TITLE_SEPARATOR`].
    pub fn with_title_parts<T: AsRef<str>>(self, parts: &[T]) -> Self {
        let title = parts
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(TITLE_SEPARATOR);
        self.with_title(title)
    }

    pub fn with_subset(mut self, in_subset: bool) -> Self {
        self.in_subset = in_subset;
        self
    }
}

/// Flag every entry whose structure appears in `subset`. Others are cleared.
pub fn mark_subset<S: AsRef<str>>(entries: &mut [GalleryEntry], subset: &[S]) {
    let subset: HashSet<&str> = subset.iter().map(|s| s.as_ref()).collect();
    for entry in entries {
        entry.in_subset = subset.contains(entry.structure.as_str());
    }
}
