//! The loaded corpus and its shared handle

use crate::chunking::Chunk;
use crate::embedding::VectorIndex;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorpusError {
    #[error("Chunk/vector count mismatch: {chunks} chunks, {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },
}

/// A chunk list paired with the index over its vectors
///
/// Row `i` of the index belongs to chunk `i`. Never mutated after
/// construction; ingestion builds a new corpus and swaps it in.
#[derive(Debug)]
pub struct Corpus {
    id: Uuid,
    chunks: Vec<Chunk>,
    index: VectorIndex,
}

impl Corpus {
    pub fn new(chunks: Vec<Chunk>, index: VectorIndex) -> Result<Self, CorpusError> {
        Self::with_id(Uuid::new_v4(), chunks, index)
    }

    /// Rebuild a corpus under a known id (e.g. one restored from disk)
    pub fn with_id(id: Uuid, chunks: Vec<Chunk>, index: VectorIndex) -> Result<Self, CorpusError> {
        if chunks.len() != index.len() {
            return Err(CorpusError::LengthMismatch {
                chunks: chunks.len(),
                vectors: index.len(),
            });
        }
        Ok(Self { id, chunks, index })
    }

    #[cfg(test)]
    pub(crate) fn new_unchecked(chunks: Vec<Chunk>, index: VectorIndex) -> Self {
        Self {
            id: Uuid::new_v4(),
            chunks,
            index,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk texts in index order
    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.text.clone()).collect()
    }
}

/// Shared reference to the currently loaded corpus
///
/// Readers take a snapshot (`Arc` clone) and work on it without holding the
/// lock. Replacement swaps the whole `Arc`, so a reader sees either the old
/// corpus or the new one, never a mix.
#[derive(Debug, Clone, Default)]
pub struct CorpusHandle {
    current: Arc<RwLock<Option<Arc<Corpus>>>>,
}

impl CorpusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The corpus loaded right now, if any
    pub fn snapshot(&self) -> Option<Arc<Corpus>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Install a new corpus, returning the one it replaced
    pub fn replace(&self, corpus: Arc<Corpus>) -> Option<Arc<Corpus>> {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.replace(corpus)
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn corpus_of(n: usize, dim: usize) -> Corpus {
        let chunks = (0..n)
            .map(|i| Chunk {
                index: i,
                text: format!("chunk {}", i),
            })
            .collect();
        let vectors = (0..n)
            .map(|i| {
                let mut v = vec![0.0; dim];
                v[i % dim] = 1.0;
                v
            })
            .collect();
        Corpus::new(chunks, VectorIndex::build(vectors, true).unwrap()).unwrap()
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let chunks = vec![Chunk {
            index: 0,
            text: "only".to_string(),
        }];
        let index = VectorIndex::build(vec![vec![1.0], vec![0.5]], true).unwrap();
        assert_eq!(
            Corpus::new(chunks, index).unwrap_err(),
            CorpusError::LengthMismatch {
                chunks: 1,
                vectors: 2
            }
        );
    }

    #[test]
    fn test_replace() {
        let handle = CorpusHandle::new();
        assert!(!handle.is_loaded());

        let first = Arc::new(corpus_of(2, 4));
        assert!(handle.replace(first.clone()).is_none());
        assert_eq!(handle.snapshot().unwrap().id(), first.id());

        let second = Arc::new(corpus_of(3, 4));
        let previous = handle.replace(second.clone()).unwrap();
        assert_eq!(previous.id(), first.id());
        assert_eq!(handle.snapshot().unwrap().len(), 3);
    }

    #[test]
    fn test_snapshot_survives_replacement() {
        let handle = CorpusHandle::new();
        handle.replace(Arc::new(corpus_of(2, 4)));

        let snapshot = handle.snapshot().unwrap();
        handle.replace(Arc::new(corpus_of(5, 4)));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.index().len(), 2);
    }

    #[test]
    fn test_concurrent_readers_never_see_mixed_corpus() {
        let handle = CorpusHandle::new();
        handle.replace(Arc::new(corpus_of(1, 8)));

        let writer = {
            let handle = handle.clone();
            thread::spawn(move || {
                for n in 1..200 {
                    handle.replace(Arc::new(corpus_of(n % 17 + 1, 8)));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let corpus = handle.snapshot().unwrap();
                        assert_eq!(corpus.chunks().len(), corpus.index().len());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
