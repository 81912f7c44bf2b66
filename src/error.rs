use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Lexlease
///
/// Only hard failures live here. Expected degradation (a single collection's
/// dense search failing, the reranker being unreachable, a case full-text
/// lookup missing) is absorbed where it is detected and surfaced through
/// `DegradedFlags` on the pipeline output instead.
#[derive(Error, Debug)]
pub enum LexError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Every collection's dense search failed in the same request
    #[error("all retrieval collections failed: {0}")]
    AllRetrievalFailed(String),

    /// Retrieval completed but produced no evidence at all
    #[error("no evidence found for query")]
    NoEvidence,

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Lexlease operations
pub type Result<T> = std::result::Result<T, LexError>;
