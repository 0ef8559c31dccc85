//! Overlapping word-window chunking
//!
//! A document is split on whitespace and cut into windows of `chunk_size`
//! words. Window `i` starts at word `i * (chunk_size - overlap)`, so
//! neighbouring windows share `overlap` words. The window position is the
//! chunk index used everywhere else (vector row `i` belongs to chunk `i`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default window size in words
pub const DEFAULT_CHUNK_SIZE: usize = 600;

/// Default number of words shared by consecutive windows
pub const DEFAULT_OVERLAP: usize = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("Chunk size must be greater than 0")]
    ZeroChunkSize,

    #[error("Overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// A contiguous word window of the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the chunk list (0-based)
    pub index: usize,
    /// Words of the window joined by single spaces
    pub text: String,
}

impl Chunk {
    /// Number chunk texts in order, e.g. when reloading a persisted chunk list
    pub fn from_texts(texts: Vec<String>) -> Vec<Chunk> {
        texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk { index, text })
            .collect()
    }
}

/// Splits text into overlapping word windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker, rejecting parameters that would never advance
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of words between the starts of consecutive windows
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Split text into chunks in document order
    ///
    /// Empty or whitespace-only text yields no chunks.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();

        (0..words.len())
            .step_by(self.step())
            .enumerate()
            .map(|(index, start)| {
                let end = (start + self.chunk_size).min(words.len());
                Chunk {
                    index,
                    text: words[start..end].join(" "),
                }
            })
            .collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Split text into overlapping word windows, returning only the window texts
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    let chunker = Chunker::new(chunk_size, overlap)?;
    Ok(chunker.split(text).into_iter().map(|c| c.text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   \n\t  ").is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let text = numbered_words(10);
        assert_eq!(
            chunk_text(&text, 100, 100),
            Err(ChunkingError::OverlapTooLarge {
                chunk_size: 100,
                overlap: 100
            })
        );
        assert_eq!(
            chunk_text(&text, 100, 150),
            Err(ChunkingError::OverlapTooLarge {
                chunk_size: 100,
                overlap: 150
            })
        );
        assert_eq!(chunk_text(&text, 0, 0), Err(ChunkingError::ZeroChunkSize));
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        let chunks = chunk_text("alpha\n\nbeta \t gamma", 10, 2).unwrap();
        assert_eq!(chunks, vec!["alpha beta gamma".to_string()]);
    }

    #[test]
    fn test_window_positions() {
        let chunks = chunk_text(&numbered_words(10), 4, 1).unwrap();
        assert_eq!(
            chunks,
            vec![
                "w0 w1 w2 w3",
                "w3 w4 w5 w6",
                "w6 w7 w8 w9",
                "w9",
            ]
        );
    }

    #[test]
    fn test_chunk_indices_follow_document_order() {
        let chunker = Chunker::new(5, 2).unwrap();
        let chunks = chunker.split(&numbered_words(23));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            let first = chunk.text.split(' ').next().unwrap();
            assert_eq!(first, format!("w{}", i * chunker.step()));
        }
    }

    #[test]
    fn test_leading_words_reconstruct_document() {
        for &(size, overlap, n) in &[(5, 2, 23), (600, 100, 1234), (3, 0, 7), (10, 9, 31)] {
            let text = numbered_words(n);
            let chunker = Chunker::new(size, overlap).unwrap();
            let chunks = chunker.split(&text);

            let rebuilt: Vec<&str> = chunks
                .iter()
                .flat_map(|c| c.text.split(' ').take(chunker.step()))
                .collect();
            let original: Vec<&str> = text.split_whitespace().collect();

            assert_eq!(rebuilt, original, "size={} overlap={}", size, overlap);
        }
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let (size, overlap) = (8, 3);
        let chunks = chunk_text(&numbered_words(50), size, overlap).unwrap();

        for pair in chunks.windows(2) {
            let current: Vec<&str> = pair[0].split(' ').collect();
            let next: Vec<&str> = pair[1].split(' ').collect();
            if current.len() < size {
                continue;
            }
            let shared = overlap.min(next.len());
            assert_eq!(&current[size - overlap..size - overlap + shared], &next[..shared]);
        }
    }

    #[test]
    fn test_default_parameters() {
        let chunker = Chunker::default();
        assert_eq!(chunker.chunk_size(), 600);
        assert_eq!(chunker.overlap(), 100);

        let chunks = chunker.split(&numbered_words(1100));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.split(' ').count(), 600);
        assert_eq!(chunks[1].text.split(' ').count(), 600);
        assert_eq!(chunks[2].text.split(' ').count(), 100);
    }
}
