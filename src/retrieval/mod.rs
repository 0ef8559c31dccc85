//! Query-time retrieval over the loaded corpus
//!
//! A question is embedded with the same provider that embedded the corpus,
//! searched against the corpus index, and the matching chunk texts are
//! returned best match first.

mod corpus;

pub use corpus::{Corpus, CorpusError, CorpusHandle};

use crate::embedding::{EmbeddingError, EmbeddingProvider, VectorIndexError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Default number of chunks returned per query
pub const DEFAULT_TOP_K: usize = 3;

/// Returned instead of context when no document has been ingested
pub const NO_DOCUMENT_LOADED: &str = "Index is not loaded. Please upload a document first.";

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Question is empty")]
    EmptyQuery,

    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector search failed: {0}")]
    Search(#[from] VectorIndexError),
}

/// A retrieved chunk with its rank score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub index: usize,
    pub score: f32,
    pub text: String,
}

/// Outcome of a scored retrieval
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieved {
    /// No corpus is loaded, or the loaded one has no chunks
    NoDocument,
    /// Chunks ranked by descending similarity
    Chunks(Vec<ScoredChunk>),
}

impl Retrieved {
    /// Context strings for prompting; the guidance sentinel when nothing is loaded
    pub fn into_texts(self) -> Vec<String> {
        match self {
            Retrieved::NoDocument => vec![NO_DOCUMENT_LOADED.to_string()],
            Retrieved::Chunks(chunks) => chunks.into_iter().map(|c| c.text).collect(),
        }
    }
}

/// Embeds questions and looks them up in the current corpus
pub struct RetrievalService {
    provider: Arc<dyn EmbeddingProvider>,
    corpus: CorpusHandle,
    default_k: usize,
}

impl RetrievalService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, corpus: CorpusHandle) -> Self {
        Self {
            provider,
            corpus,
            default_k: DEFAULT_TOP_K,
        }
    }

    /// Override the number of chunks returned when the caller gives no `k`
    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k;
        self
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn corpus(&self) -> &CorpusHandle {
        &self.corpus
    }

    /// Top-k chunk texts for `query` against the currently loaded corpus
    pub fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<String>, RetrievalError> {
        let corpus = self.corpus.snapshot();
        self.retrieve_from(query, corpus.as_deref(), k)
    }

    /// Top-k chunk texts for `query` against an explicit corpus
    ///
    /// Returns the single `NO_DOCUMENT_LOADED` sentinel when `corpus` is
    /// absent or empty.
    pub fn retrieve_from(
        &self,
        query: &str,
        corpus: Option<&Corpus>,
        k: Option<usize>,
    ) -> Result<Vec<String>, RetrievalError> {
        Ok(self.retrieve_scored_from(query, corpus, k)?.into_texts())
    }

    /// Ranked chunks with scores against the currently loaded corpus
    pub fn retrieve_scored(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Retrieved, RetrievalError> {
        let corpus = self.corpus.snapshot();
        self.retrieve_scored_from(query, corpus.as_deref(), k)
    }

    /// Ranked chunks with scores against an explicit corpus
    pub fn retrieve_scored_from(
        &self,
        query: &str,
        corpus: Option<&Corpus>,
        k: Option<usize>,
    ) -> Result<Retrieved, RetrievalError> {
        let corpus = match corpus {
            Some(corpus) if !corpus.is_empty() => corpus,
            _ => {
                tracing::debug!("Query received with no document loaded");
                return Ok(Retrieved::NoDocument);
            }
        };

        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let k = k.unwrap_or(self.default_k);
        let query_vector = self.provider.embed(query)?;
        let results = corpus.index().search(&query_vector, k)?;

        let chunks = corpus.chunks();
        let mut scored = Vec::with_capacity(results.len());
        for result in results {
            match chunks.get(result.index) {
                Some(chunk) => scored.push(ScoredChunk {
                    index: result.index,
                    score: result.score,
                    text: chunk.text.clone(),
                }),
                None => {
                    tracing::warn!(
                        "Dropping search result {} outside chunk list of {} (corpus {})",
                        result.index,
                        chunks.len(),
                        corpus.id()
                    );
                }
            }
        }

        tracing::debug!("Retrieved {} chunks (k={})", scored.len(), k);

        Ok(Retrieved::Chunks(scored))
    }
}
