use std::path::PathBuf;
use thiserror::Error;

use crate::chunking::ChunkingError;
use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::extract::ExtractError;
use crate::llm::LlmError;
use crate::retrieval::{CorpusError, RetrievalError};
use crate::storage::PersistenceError;

/// Main error type for docqa
#[derive(Error, Debug)]
pub enum DocQaError {
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

    /// Invalid chunking parameters
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    /// Embedding generation errors
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Vector index construction or search errors
    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError),

    /// Chunk list and index disagree
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    /// Query-time retrieval errors
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Persisted corpus errors
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Document text extraction errors
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Language model errors
    #[error(transparent)]
    Llm(#[from] LlmError),

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

    /// Server errors
    #[error("Server error: {0}")]
    Server(String),

    /// Server not running
    #[error("Server is not running at {socket:?}")]
    ServerNotRunning { socket: PathBuf },

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

/// Result type for docqa operations
pub type Result<T> = std::result::Result<T, DocQaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn read_missing(path: &std::path::Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path).with_context(|| format!("Cannot read document: {:?}", path))?)
    }

    #[test]
    fn test_edge_context_becomes_other() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = read_missing(&temp.path().join("absent.pdf")).unwrap_err();

        assert!(matches!(err, DocQaError::Other(_)));
        assert!(err.to_string().starts_with("Cannot read document"));
    }

    #[test]
    fn test_subsystem_errors_are_transparent() {
        let err: DocQaError = crate::llm::LlmError::Disabled.into();
        assert_eq!(err.to_string(), crate::llm::LlmError::Disabled.to_string());
    }
}
