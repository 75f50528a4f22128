use crate::embedding::EmbeddingError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for GeistFabrik
#[derive(Error, Debug)]
pub enum GeistError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Session related errors
    #[error("Session error: {0}")]
    Session(String),

    /// Operation attempted in the wrong session lifecycle state
    #[error("Session is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Note lookup failed
    #[error("Note not found: {path}")]
    NoteNotFound { path: String },

    /// Embedding model failures that could not be contained
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Embedding store failures (pool exhaustion, corrupt rows)
    #[error("Store error: {0}")]
    Store(String),

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

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Registered extension (metadata inferrer or query function) failed
    #[error("Extension '{name}' failed: {message}")]
    Extension { name: String, message: String },

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

/// Result type for GeistFabrik operations
pub type Result<T> = std::result::Result<T, GeistError>;
