//! Persisted corpus storage
//!
//! A corpus is stored as three artifacts in one directory:
//! - `chunks.json`: the chunk texts, in index order
//! - `embeddings.bin`: the embedding matrix (see [`matrix`])
//! - `manifest.json`: model identity (including whether rows are unit
//!   normalized), counts and BLAKE3 hashes of both artifacts
//!
//! Every artifact is written to a temporary file and renamed into place, the
//! manifest last. A load only succeeds when all three agree, so a crash in the
//! middle of a save reads back as "no corpus" rather than a torn one.

pub mod matrix;

use crate::embedding::ModelIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const CHUNKS_FILE: &str = "chunks.json";
const EMBEDDINGS_FILE: &str = "embeddings.bin";
const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Persisted corpus is incomplete: missing {0}")]
    Missing(String),

    #[error("Persisted corpus is corrupt: {0}")]
    Corrupt(String),

    #[error("Persisted corpus was built with {stored:?}, active model is {active:?}")]
    ModelMismatch {
        stored: ModelIdentity,
        active: ModelIdentity,
    },

    #[error("Chunk/vector count mismatch: {chunks} chunks, {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },
}

/// Metadata written alongside a persisted corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub corpus_id: Uuid,
    pub model: String,
    pub dimension: usize,
    pub normalized: bool,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub chunks_blake3: String,
    pub embeddings_blake3: String,
}

/// A corpus read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedCorpus {
    pub corpus_id: Uuid,
    pub chunks: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

/// Saves and loads the chunk list and embedding matrix of one corpus
pub struct IndexStore {
    dir: PathBuf,
    identity: ModelIdentity,
}

impl IndexStore {
    /// Create a store rooted at `dir` for vectors of the given model identity
    pub fn new(dir: PathBuf, identity: ModelIdentity) -> Self {
        Self { dir, identity }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    /// Replace the persisted corpus with `chunks` and `vectors`
    pub fn save(
        &self,
        corpus_id: Uuid,
        chunks: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<Manifest, PersistenceError> {
        if chunks.len() != vectors.len() {
            return Err(PersistenceError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        if !vectors.is_empty() && dimension != self.identity.dimension {
            return Err(PersistenceError::ModelMismatch {
                stored: ModelIdentity::new(self.identity.model.clone(), dimension)
                    .with_normalized(self.identity.normalized),
                active: self.identity.clone(),
            });
        }

        fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::Io {
            source: e,
            context: format!("Failed to create corpus directory: {}", self.dir.display()),
        })?;

        let chunks_bytes = serde_json::to_vec(chunks).map_err(|e| PersistenceError::Json {
            source: e,
            context: "Failed to serialize chunk list".to_string(),
        })?;
        let embeddings_bytes = matrix::encode(vectors, dimension)?;

        let manifest = Manifest {
            format_version: MANIFEST_VERSION,
            corpus_id,
            model: self.identity.model.clone(),
            dimension,
            normalized: self.identity.normalized,
            chunk_count: chunks.len(),
            created_at: Utc::now(),
            chunks_blake3: blake3::hash(&chunks_bytes).to_hex().to_string(),
            embeddings_blake3: blake3::hash(&embeddings_bytes).to_hex().to_string(),
        };
        let manifest_bytes =
            serde_json::to_vec_pretty(&manifest).map_err(|e| PersistenceError::Json {
                source: e,
                context: "Failed to serialize manifest".to_string(),
            })?;

        self.write_atomic(CHUNKS_FILE, &chunks_bytes)?;
        self.write_atomic(EMBEDDINGS_FILE, &embeddings_bytes)?;
        self.write_atomic(MANIFEST_FILE, &manifest_bytes)?;

        tracing::info!(
            "Persisted corpus {} ({} chunks, {}D) to {}",
            corpus_id,
            chunks.len(),
            dimension,
            self.dir.display()
        );

        Ok(manifest)
    }

    /// Load the persisted corpus, treating any problem as "nothing persisted"
    pub fn load(&self) -> Option<PersistedCorpus> {
        match self.try_load() {
            Ok(corpus) => corpus,
            Err(e) => {
                tracing::warn!("Ignoring persisted corpus in {}: {}", self.dir.display(), e);
                None
            }
        }
    }

    /// Load the persisted corpus
    ///
    /// `Ok(None)` means no corpus was ever saved here. Partial, corrupt or
    /// foreign-model artifacts are errors.
    pub fn try_load(&self) -> Result<Option<PersistedCorpus>, PersistenceError> {
        let present: Vec<bool> = [MANIFEST_FILE, CHUNKS_FILE, EMBEDDINGS_FILE]
            .iter()
            .map(|name| self.dir.join(name).exists())
            .collect();
        if present.iter().all(|p| !p) {
            return Ok(None);
        }

        let manifest_bytes = self.read_artifact(MANIFEST_FILE)?;
        let chunks_bytes = self.read_artifact(CHUNKS_FILE)?;
        let embeddings_bytes = self.read_artifact(EMBEDDINGS_FILE)?;

        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| PersistenceError::Corrupt(format!("manifest: {}", e)))?;

        if manifest.format_version != MANIFEST_VERSION {
            return Err(PersistenceError::Corrupt(format!(
                "unsupported manifest version {}",
                manifest.format_version
            )));
        }

        let stored = ModelIdentity::new(manifest.model.clone(), manifest.dimension)
            .with_normalized(manifest.normalized);
        let dimension_matches =
            manifest.chunk_count == 0 || manifest.dimension == self.identity.dimension;
        if stored.model != self.identity.model
            || stored.normalized != self.identity.normalized
            || !dimension_matches
        {
            return Err(PersistenceError::ModelMismatch {
                stored,
                active: self.identity.clone(),
            });
        }

        if blake3::hash(&chunks_bytes).to_hex().as_str() != manifest.chunks_blake3 {
            return Err(PersistenceError::Corrupt(
                "chunk list does not match manifest hash".to_string(),
            ));
        }
        if blake3::hash(&embeddings_bytes).to_hex().as_str() != manifest.embeddings_blake3 {
            return Err(PersistenceError::Corrupt(
                "embedding matrix does not match manifest hash".to_string(),
            ));
        }

        let chunks: Vec<String> = serde_json::from_slice(&chunks_bytes)
            .map_err(|e| PersistenceError::Corrupt(format!("chunk list: {}", e)))?;
        let (vectors, cols) = matrix::decode(&embeddings_bytes)?;

        if chunks.len() != vectors.len() {
            return Err(PersistenceError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if chunks.len() != manifest.chunk_count || (!vectors.is_empty() && cols != manifest.dimension)
        {
            return Err(PersistenceError::Corrupt(format!(
                "manifest declares {} chunks of {}D, artifacts hold {} chunks of {}D",
                manifest.chunk_count,
                manifest.dimension,
                chunks.len(),
                cols
            )));
        }

        tracing::info!(
            "Loaded persisted corpus {} ({} chunks, created {})",
            manifest.corpus_id,
            chunks.len(),
            manifest.created_at.to_rfc3339()
        );

        Ok(Some(PersistedCorpus {
            corpus_id: manifest.corpus_id,
            chunks,
            vectors,
        }))
    }

    fn read_artifact(&self, name: &str) -> Result<Vec<u8>, PersistenceError> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Err(PersistenceError::Missing(name.to_string()));
        }
        fs::read(&path).map_err(|e| PersistenceError::Io {
            source: e,
            context: format!("Failed to read {}", path.display()),
        })
    }

    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let final_path = self.dir.join(name);
        let temp_path = self.dir.join(format!("{}.tmp", name));

        let mut file = fs::File::create(&temp_path).map_err(|e| PersistenceError::Io {
            source: e,
            context: format!("Failed to create {}", temp_path.display()),
        })?;
        file.write_all(data).map_err(|e| PersistenceError::Io {
            source: e,
            context: format!("Failed to write {}", temp_path.display()),
        })?;
        file.sync_all().map_err(|e| PersistenceError::Io {
            source: e,
            context: format!("Failed to sync {}", temp_path.display()),
        })?;
        drop(file);

        fs::rename(&temp_path, &final_path).map_err(|e| PersistenceError::Io {
            source: e,
            context: format!(
                "Failed to rename {} -> {}",
                temp_path.display(),
                final_path.display()
            ),
        })
    }
}
