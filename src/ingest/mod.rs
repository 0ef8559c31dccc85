//! Document ingestion
//!
//! Ingestion builds a complete new corpus off to the side (chunk, embed,
//! index, persist) and only then swaps it into the shared handle. Any failure
//! before the swap leaves the live corpus untouched.

use crate::chunking::{Chunk, Chunker};
use crate::embedding::{EmbeddingError, EmbeddingProvider, VectorIndex};
use crate::error::Result;
use crate::extract;
use crate::retrieval::{Corpus, CorpusHandle};
use crate::storage::IndexStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a successful ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub corpus_id: Uuid,
    pub chunk_count: usize,
    pub dimension: usize,
    pub duration_ms: u64,
}

/// Turns document text into the active corpus
pub struct Ingestor {
    chunker: Chunker,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<IndexStore>,
    corpus: CorpusHandle,
    batch_size: usize,
    normalize: bool,
    commit_lock: Mutex<()>,
}

impl Ingestor {
    /// Create an ingestor
    ///
    /// # Arguments
    /// * `chunker` - Word-window chunker
    /// * `provider` - Embedding provider (must match the one used for queries)
    /// * `store` - Persistence for the corpus; its identity decides whether
    ///   vectors are normalized
    /// * `corpus` - Shared handle the new corpus is swapped into
    pub fn new(
        chunker: Chunker,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<IndexStore>,
        corpus: CorpusHandle,
    ) -> Self {
        let normalize = store.identity().normalized;
        Self {
            chunker,
            provider,
            store,
            corpus,
            batch_size: 32,
            normalize,
            commit_lock: Mutex::new(()),
        }
    }

    /// Number of chunks sent to the provider per call
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn corpus(&self) -> &CorpusHandle {
        &self.corpus
    }

    /// Extract a document from disk and ingest its text
    pub fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        info!("Ingesting document {}", path.display());
        let text = extract::extract_text(path)?;
        self.ingest_text(&text)
    }

    /// Extract an uploaded document held in memory and ingest its text
    pub fn ingest_bytes(&self, name: &str, bytes: &[u8]) -> Result<IngestReport> {
        info!("Ingesting uploaded document {} ({} bytes)", name, bytes.len());
        let text = extract::extract_bytes(name, bytes)?;
        self.ingest_text(&text)
    }

    /// Replace the active corpus with one built from `text`
    pub fn ingest_text(&self, text: &str) -> Result<IngestReport> {
        let start = Instant::now();

        let chunks = self.chunker.split(text);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        info!(
            "Split document into {} chunks (size={}, overlap={})",
            chunks.len(),
            self.chunker.chunk_size(),
            self.chunker.overlap()
        );

        let vectors = self.embed_all(&texts)?;
        let index = VectorIndex::build(vectors, self.normalize)?;
        let corpus = Corpus::new(chunks, index)?;
        let corpus_id = corpus.id();
        let dimension = corpus.index().dimension();

        {
            let _guard = match self.commit_lock.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.store
                .save(corpus.id(), &texts, &corpus.index().to_vectors())?;
            self.corpus.replace(Arc::new(corpus));
        }

        let report = IngestReport {
            corpus_id,
            chunk_count: texts.len(),
            dimension,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Ingestion complete: {} chunks, {}D, {}ms",
            report.chunk_count, report.dimension, report.duration_ms
        );

        Ok(report)
    }

    /// Load the persisted corpus, if any, into the shared handle
    ///
    /// Returns the number of restored chunks. Unusable persisted state is
    /// logged and leaves the handle empty.
    pub fn restore(&self) -> Option<usize> {
        let persisted = self.store.load()?;

        let chunks = Chunk::from_texts(persisted.chunks);
        let index = match VectorIndex::from_stored(persisted.vectors, self.normalize) {
            Ok(index) => index,
            Err(e) => {
                warn!("Persisted embeddings cannot be indexed: {}", e);
                return None;
            }
        };
        let corpus = match Corpus::with_id(persisted.corpus_id, chunks, index) {
            Ok(corpus) => corpus,
            Err(e) => {
                warn!("Persisted corpus is inconsistent: {}", e);
                return None;
            }
        };

        let count = corpus.len();
        self.corpus.replace(Arc::new(corpus));
        info!("Restored corpus with {} chunks", count);
        Some(count)
    }

    /// Embed all chunk texts in provider batches, preserving order
    fn embed_all(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_number, batch) in texts.chunks(self.batch_size).enumerate() {
            let embeddings = self.provider.embed_batch(batch)?;
            if embeddings.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: embeddings.len(),
                });
            }
            debug!("Embedded batch {} ({} chunks)", batch_number, batch.len());
            vectors.extend(embeddings);
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashEmbedProvider, ModelIdentity};
    use crate::error::DocQaError;
    use tempfile::TempDir;

    /// Returns vectors whose length depends on the text, to provoke build failures
    struct RaggedProvider;

    impl EmbeddingProvider for RaggedProvider {
        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| vec![1.0; t.split(' ').count()])
                .collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "ragged"
        }
    }

    /// Fixed vectors of very different lengths
    struct RawProvider;

    impl EmbeddingProvider for RawProvider {
        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("big") { vec![10.0, 1.0] } else { vec![0.0, 1.0] })
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "raw"
        }
    }

    fn ingestor(temp: &TempDir, provider: Arc<dyn EmbeddingProvider>) -> Ingestor {
        ingestor_with(temp, provider, true)
    }

    fn ingestor_with(
        temp: &TempDir,
        provider: Arc<dyn EmbeddingProvider>,
        normalized: bool,
    ) -> Ingestor {
        let store = Arc::new(IndexStore::new(
            temp.path().join("corpus"),
            ModelIdentity::of(provider.as_ref()).with_normalized(normalized),
        ));
        Ingestor::new(
            Chunker::new(4, 1).unwrap(),
            provider,
            store,
            CorpusHandle::new(),
        )
        .with_batch_size(2)
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_ingest_text_swaps_corpus() {
        let temp = TempDir::new().unwrap();
        let ingestor = ingestor(&temp, Arc::new(HashEmbedProvider::new(32)));

        let report = ingestor.ingest_text(&words(10)).unwrap();
        assert_eq!(report.chunk_count, 4);
        assert_eq!(report.dimension, 32);

        let corpus = ingestor.corpus().snapshot().unwrap();
        assert_eq!(corpus.id(), report.corpus_id);
        assert_eq!(corpus.len(), 4);
        assert_eq!(corpus.index().len(), 4);
        assert_eq!(corpus.chunks()[1].text, "word3 word4 word5 word6");
    }

    #[test]
    fn test_new_document_replaces_old() {
        let temp = TempDir::new().unwrap();
        let ingestor = ingestor(&temp, Arc::new(HashEmbedProvider::new(32)));

        ingestor.ingest_text(&words(10)).unwrap();
        let report = ingestor.ingest_text("short document").unwrap();
        assert_eq!(report.chunk_count, 1);

        let corpus = ingestor.corpus().snapshot().unwrap();
        assert_eq!(corpus.texts(), vec!["short document".to_string()]);
    }

    #[test]
    fn test_failed_build_keeps_previous_corpus() {
        let temp = TempDir::new().unwrap();
        let good = ingestor(&temp, Arc::new(HashEmbedProvider::new(32)));
        good.ingest_text(&words(10)).unwrap();
        let before = good.corpus().snapshot().unwrap().id();

        let store = Arc::new(IndexStore::new(
            temp.path().join("corpus"),
            ModelIdentity::new("ragged", 4),
        ));
        let bad = Ingestor::new(
            Chunker::new(4, 1).unwrap(),
            Arc::new(RaggedProvider),
            store,
            good.corpus().clone(),
        );

        let result = bad.ingest_text(&words(6));
        assert!(matches!(result, Err(DocQaError::VectorIndex(_))));
        assert_eq!(good.corpus().snapshot().unwrap().id(), before);
    }

    #[test]
    fn test_invalid_chunking_never_builds() {
        assert!(Chunker::new(100, 150).is_err());
    }

    #[test]
    fn test_empty_document() {
        let temp = TempDir::new().unwrap();
        let ingestor = ingestor(&temp, Arc::new(HashEmbedProvider::new(32)));

        let report = ingestor.ingest_text("   ").unwrap();
        assert_eq!(report.chunk_count, 0);
        assert!(ingestor.corpus().snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_restore_after_restart() {
        let temp = TempDir::new().unwrap();
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedProvider::new(32));

        let first = ingestor(&temp, provider.clone());
        let report = first.ingest_text(&words(10)).unwrap();
        let original = first.corpus().snapshot().unwrap();

        let second = ingestor(&temp, provider);
        assert_eq!(second.restore(), Some(4));

        let restored = second.corpus().snapshot().unwrap();
        assert_eq!(restored.id(), report.corpus_id);
        assert_eq!(restored.texts(), original.texts());
        assert_eq!(restored.index().to_vectors(), original.index().to_vectors());
    }

    #[test]
    fn test_normalization_follows_store_identity() {
        let temp = TempDir::new().unwrap();
        let raw = ingestor_with(&temp, Arc::new(RawProvider), false);
        raw.ingest_text("big small").unwrap();

        let corpus = raw.corpus().snapshot().unwrap();
        assert!(!corpus.index().is_normalized());
        assert_eq!(corpus.index().to_vectors()[0], vec![10.0, 1.0]);

        let same = ingestor_with(&temp, Arc::new(RawProvider), false);
        assert_eq!(same.restore(), Some(1));
    }

    #[test]
    fn test_normalization_change_discards_persisted_corpus() {
        let temp = TempDir::new().unwrap();
        let raw = Ingestor::new(
            Chunker::new(1, 0).unwrap(),
            Arc::new(RawProvider),
            Arc::new(IndexStore::new(
                temp.path().join("corpus"),
                ModelIdentity::new("raw", 2).with_normalized(false),
            )),
            CorpusHandle::new(),
        );
        let report = raw.ingest_text("big small").unwrap();
        assert_eq!(report.chunk_count, 2);

        let normalized = ingestor_with(&temp, Arc::new(RawProvider), true);
        assert_eq!(normalized.restore(), None);
        assert!(!normalized.corpus().is_loaded());
    }

    #[test]
    fn test_restore_with_nothing_persisted() {
        let temp = TempDir::new().unwrap();
        let ingestor = ingestor(&temp, Arc::new(HashEmbedProvider::new(32)));
        assert_eq!(ingestor.restore(), None);
        assert!(!ingestor.corpus().is_loaded());
    }

    #[test]
    fn test_ingest_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, words(7)).unwrap();

        let ingestor = ingestor(&temp, Arc::new(HashEmbedProvider::new(32)));
        let report = ingestor.ingest_file(&path).unwrap();
        assert_eq!(report.chunk_count, 3);
    }

    #[test]
    fn test_ingest_uploaded_bytes() {
        let temp = TempDir::new().unwrap();
        let ingestor = ingestor(&temp, Arc::new(HashEmbedProvider::new(32)));

        let report = ingestor.ingest_bytes("notes.txt", words(7).as_bytes()).unwrap();
        assert_eq!(report.chunk_count, 3);

        let result = ingestor.ingest_bytes("broken.pdf", b"not a pdf");
        assert!(matches!(result, Err(DocQaError::Extract(_))));
        assert_eq!(ingestor.corpus().snapshot().unwrap().id(), report.corpus_id);
    }
}
