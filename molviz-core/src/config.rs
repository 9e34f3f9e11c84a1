//! Configuration types

use crate::{ConfigError, MolvizError, MolvizResult, DEFAULT_RENDER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Subdirectory of the cache dir holding the artifact store.
pub const STORE_SUBDIR: &str = "molimages";

/// Store size that triggers a trim.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Store size a trim brings the store back down to.
pub const DEFAULT_TRIM_TARGET: usize = 900;

/// Largest accepted LMDB map size (1 TiB).
pub const MAX_MAP_SIZE_MB: usize = 1024 * 1024;

/// Remote renderer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRenderConfig {
    /// Fallback endpoint receiving the form-encoded render request.
    pub endpoint: String,
    /// Optional shared secret sent as the `password` form field.
    #[serde(default)]
    pub password: Option<String>,
    /// HTTP timeout for one render request.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MolvizConfig {
    // Artifact store
    pub cache_dir: PathBuf,
    pub max_entries: usize,
    pub trim_target: usize,
    /// LMDB map size in megabytes.
    pub map_size_mb: usize,

    // Rendering
    pub default_size: u32,
    /// Upper bound on any single backend call made while the cache lock is held.
    #[serde(with = "duration_millis")]
    pub render_timeout: Duration,
    #[serde(default)]
    pub remote: Option<RemoteRenderConfig>,

    // Matching (0 disables the memo)
    pub match_memo_capacity: usize,
}

impl Default for MolvizConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("molviz");

        Self {
            cache_dir,
            max_entries: DEFAULT_MAX_ENTRIES,
            trim_target: DEFAULT_TRIM_TARGET,
            map_size_mb: 256,
            default_size: DEFAULT_RENDER_SIZE,
            render_timeout: Duration::from_secs(30),
            remote: None,
            match_memo_capacity: 0,
        }
    }
}

impl MolvizConfig {
    /// Directory of the durable artifact store.
    pub fn store_path(&self) -> PathBuf {
        self.cache_dir.join(STORE_SUBDIR)
    }

    /// Load configuration from `MOLVIZ_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_dir = std::env::var("MOLVIZ_CACHE_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let max_entries = std::env::var("MOLVIZ_MAX_ENTRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_entries);

        let trim_target = std::env::var("MOLVIZ_TRIM_TARGET")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.trim_target);

        let map_size_mb = std::env::var("MOLVIZ_MAP_SIZE_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.map_size_mb);

        let default_size = std::env::var("MOLVIZ_DEFAULT_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.default_size);

        let render_timeout = std::env::var("MOLVIZ_RENDER_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.render_timeout);

        let remote = std::env::var("MOLVIZ_REMOTE_ENDPOINT")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|endpoint| RemoteRenderConfig {
                endpoint,
                password: std::env::var("MOLVIZ_REMOTE_PASSWORD").ok(),
                timeout: std::env::var("MOLVIZ_REMOTE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::from_secs(10)),
            });

        let match_memo_capacity = std::env::var("MOLVIZ_MATCH_MEMO_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.match_memo_capacity);

        Self {
            cache_dir,
            max_entries,
            trim_target,
            map_size_mb,
            default_size,
            render_timeout,
            remote,
            match_memo_capacity,
        }
    }

    /// Parse a TOML document. Every field is required except `remote`.
    pub fn from_toml_str(source: &str) -> MolvizResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| {
            MolvizError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_entries > 0 and trim_target <= max_entries
    /// - 0 < map_size_mb <= MAX_MAP_SIZE_MB
    /// - default_size > 0
    /// - render_timeout and remote timeout are positive
    /// - remote endpoint is an http(s) URL
    pub fn validate(&self) -> MolvizResult<()> {
        if self.max_entries == 0 {
            return Err(invalid(
                "max_entries",
                self.max_entries.to_string(),
                "max_entries must be greater than 0",
            ));
        }

        if self.trim_target > self.max_entries {
            return Err(invalid(
                "trim_target",
                self.trim_target.to_string(),
                "trim_target must not exceed max_entries",
            ));
        }

        if self.map_size_mb == 0 {
            return Err(invalid(
                "map_size_mb",
                self.map_size_mb.to_string(),
                "map_size_mb must be greater than 0",
            ));
        }

        if self.map_size_mb > MAX_MAP_SIZE_MB {
            return Err(invalid(
                "map_size_mb",
                self.map_size_mb.to_string(),
                "map_size_mb must not exceed 1048576 (1 TiB)",
            ));
        }

        if self.default_size == 0 {
            return Err(invalid(
                "default_size",
                self.default_size.to_string(),
                "default_size must be greater than 0",
            ));
        }

        if self.render_timeout.is_zero() {
            return Err(invalid(
                "render_timeout",
                format!("{:?}", self.render_timeout),
                "render_timeout must be positive",
            ));
        }

        if let Some(remote) = &self.remote {
            if !(remote.endpoint.starts_with("http://") || remote.endpoint.starts_with("https://"))
            {
                return Err(invalid(
                    "remote.endpoint",
                    remote.endpoint.clone(),
                    "remote.endpoint must be an http(s) URL",
                ));
            }
            if remote.timeout.is_zero() {
                return Err(invalid(
                    "remote.timeout",
                    format!("{:?}", remote.timeout),
                    "remote.timeout must be positive",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> MolvizError {
    MolvizError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

/// Durations are written as integer milliseconds in config files.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
