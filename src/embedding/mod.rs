/// Embedding & Indexing
///
/// This module provides local embedding generation and exact vector search.
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - HashEmbedProvider for deterministic offline embedding (tests, no model download)
/// - VectorIndex for brute-force inner product search
mod hash;
mod provider;
mod vector_index;

pub use hash::HashEmbedProvider;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{SearchResult, VectorIndex, VectorIndexError};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity of the vector space a corpus was embedded into
///
/// Vectors from different identities are not comparable, so a persisted
/// corpus is only reused when its identity matches the active provider.
/// Raw and unit-normalized rows count as different spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub model: String,
    pub dimension: usize,
    pub normalized: bool,
}

impl ModelIdentity {
    /// Identity of a model whose vectors are normalized to unit length
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
            normalized: true,
        }
    }

    /// Identity of the given provider
    pub fn of(provider: &dyn EmbeddingProvider) -> Self {
        Self::new(provider.model_name(), provider.dimension())
    }

    /// Set whether stored rows and queries are normalized
    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }
}

/// Scale a vector to unit length in place
///
/// Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Build the provider named in the embedding configuration
pub fn provider_from_config(
    config: &crate::config::EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "fastembed" => {
            let provider = FastEmbedProvider::new(&config.model)?.with_batch_size(config.batch_size);
            Ok(Arc::new(provider))
        }
        "hash" => Ok(Arc::new(HashEmbedProvider::new(config.dimension))),
        other => Err(EmbeddingError::InitializationError(format!(
            "Unsupported embedding provider: {}. Supported: fastembed, hash",
            other
        ))),
    }
}
