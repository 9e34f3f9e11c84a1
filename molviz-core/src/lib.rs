//! molviz Core - Shared Types
//!
//! Cache keys, the error taxonomy and configuration. Every other molviz crate
//! depends on this one; it holds no I/O and no business logic.

pub mod config;
pub mod error;
pub mod key;

pub use config::{
    MolvizConfig, RemoteRenderConfig, DEFAULT_MAX_ENTRIES, DEFAULT_TRIM_TARGET, MAX_MAP_SIZE_MB,
    STORE_SUBDIR,
};
pub use error::{ConfigError, MatchError, MolvizError, MolvizResult, RenderError, StoreError};
pub use key::{CacheKey, StoreKey, DEFAULT_RENDER_SIZE};
