//! Cache keys and their canonical store-key encoding.
//!
//! A [`CacheKey`] identifies one renderable artifact. Every field takes part in
//! identity, including `title`, which never changes the rendered pixels: two
//! requests that differ only in title occupy two store slots.
//!
//! [`StoreKey`] is the canonical string form written to the artifact store.
//! It must be identical for equal keys in every process, so it is built from
//! the field values alone and never from a seeded hash.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Field separator inside an encoded store key (ASCII unit separator).
const SEPARATOR: char = '\u{1f}';

/// Escape character used when a field contains `SEPARATOR` or itself.
const ESCAPE: char = '\u{1b}';

/// Number of fields in an encoded key.
const FIELD_COUNT: usize = 5;

/// Default render dimension in pixels.
pub const DEFAULT_RENDER_SIZE: u32 = 200;

/// Identity of one rendering artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    structure: String,
    highlight: String,
    size: u32,
    title: String,
    grayed_background: bool,
}

impl CacheKey {
    /// Create a key for an unhighlighted, untitled rendering.
    pub fn new(structure: impl Into<String>, size: u32) -> Self {
        Self {
            structure: structure.into(),
            highlight: String::new(),
            size,
            title: String::new(),
            grayed_background: false,
        }
    }

    /// Set the substructure to highlight. An empty string means no highlight.
    pub fn with_highlight(mut self, highlight: impl Into<String>) -> Self {
        self.highlight = highlight.into();
        self
    }

    /// Set the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the muted background flag.
    pub fn with_grayed_background(mut self, grayed: bool) -> Self {
        self.grayed_background = grayed;
        self
    }

    pub fn structure(&self) -> &str {
        &self.structure
    }

    /// Raw highlight field; empty when there is no highlight.
    pub fn highlight(&self) -> &str {
        &self.highlight
    }

    /// Highlight as an option, `None` for the empty string.
    pub fn highlight_opt(&self) -> Option<&str> {
        if self.highlight.is_empty() {
            None
        } else {
            Some(&self.highlight)
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn grayed_background(&self) -> bool {
        self.grayed_background
    }

    /// Canonical store key for this cache key.
    pub fn store_key(&self) -> StoreKey {
        StoreKey::from(self)
    }
}

/// Canonical string form of a [`CacheKey`].
///
/// # Format
///
/// `structure US highlight US size US title US flag`, where `US` is U+001F and
/// `flag` is `0` or `1`. Inside the text fields, U+001B is written as
/// `ESC ESC` and U+001F as `ESC u`, so the encoding is injective.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Rebuild a store key from its raw text, validating the layout.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::decode_fields(raw)?;
        Some(Self(raw.to_string()))
    }

    /// Recover the cache key this store key was derived from.
    pub fn decode(&self) -> Option<CacheKey> {
        let fields = Self::decode_fields(&self.0)?;
        let [structure, highlight, size, title, flag]: [String; FIELD_COUNT] =
            fields.try_into().ok()?;

        let size = size.parse::<u32>().ok()?;
        let grayed_background = match flag.as_str() {
            "0" => false,
            "1" => true,
            _ => return None,
        };

        Some(CacheKey {
            structure,
            highlight,
            size,
            title,
            grayed_background,
        })
    }

    fn decode_fields(raw: &str) -> Option<Vec<String>> {
        let mut fields = Vec::with_capacity(FIELD_COUNT);
        let mut current = String::new();
        let mut chars = raw.chars();

        while let Some(ch) = chars.next() {
            match ch {
                ESCAPE => match chars.next()? {
                    ESCAPE => current.push(ESCAPE),
                    'u' => current.push(SEPARATOR),
                    _ => return None,
                },
                SEPARATOR => fields.push(std::mem::take(&mut current)),
                other => current.push(other),
            }
        }
        fields.push(current);

        if fields.len() == FIELD_COUNT {
            Some(fields)
        } else {
            None
        }
    }
}

fn push_escaped(out: &mut String, field: &str) {
    for ch in field.chars() {
        match ch {
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPE);
            }
            SEPARATOR => {
                out.push(ESCAPE);
                out.push('u');
            }
            other => out.push(other),
        }
    }
}

impl From<&CacheKey> for StoreKey {
    fn from(key: &CacheKey) -> Self {
        let mut out = String::with_capacity(
            key.structure.len() + key.highlight.len() + key.title.len() + 16,
        );
        push_escaped(&mut out, &key.structure);
        out.push(SEPARATOR);
        push_escaped(&mut out, &key.highlight);
        out.push(SEPARATOR);
        out.push_str(&key.size.to_string());
        out.push(SEPARATOR);
        push_escaped(&mut out, &key.title);
        out.push(SEPARATOR);
        out.push(if key.grayed_background { '1' } else { '0' });
        Self(out)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Separators are not printable; show them as `%%` for logs.
        for ch in self.0.chars() {
            match ch {
                SEPARATOR => f.write_str("%%")?,
                ESCAPE => f.write_str("\\e")?,
                other => write!(f, "{}", other)?,
            }
        }
        Ok(())
    }
}
