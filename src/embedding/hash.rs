/// Deterministic feature-hashing embedder
use super::{l2_normalize, EmbeddingError, EmbeddingProvider};

/// Embeds text by hashing lower-cased tokens into a fixed number of buckets
///
/// Each token adds +1 or -1 to one bucket, both picked from its BLAKE3 hash.
/// The result is L2-normalized, so texts sharing vocabulary get a high inner
/// product. No model download is involved, which makes this provider useful
/// for tests and fully offline setups.
pub struct HashEmbedProvider {
    dimension: usize,
    model_name: String,
}

impl HashEmbedProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: format!("hash-{}", dimension),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();

            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for HashEmbedProvider {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::InvalidInput(
                "Hash embedder dimension must be greater than 0".to_string(),
            ));
        }
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
