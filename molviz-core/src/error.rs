//! Error types for molviz operations

use std::time::Duration;
use thiserror::Error;

/// Artifact store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Artifact store unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Corrupt entry for key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Render backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("No render backend available")]
    NoBackend,

    #[error("Render backend {backend} failed: {message}")]
    BackendFailed { backend: String, message: String },

    #[error("Request to {backend} failed with status {status}: {message}")]
    RequestFailed {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("Render backend {backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    #[error("wrong SMILES notation: {structure}")]
    InvalidStructure { structure: String },
}

/// Substructure match errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid structure {structure:?}: {reason}")]
    InvalidStructure { structure: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all molviz errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MolvizError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Match error: {0}")]
    Match(#[from] MatchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for molviz operations.
pub type MolvizResult<T> = Result<T, MolvizError>;

// =============================================================================
// TESTS
// =============================================================================
