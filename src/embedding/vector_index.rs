/// Exact inner-product vector index
use super::l2_normalize;
use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorIndexError {
    #[error("Dimension mismatch at vector {position}: expected {expected}, got {actual}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Query dimension mismatch: index has {expected}, query has {actual}")]
    QueryDimensionMismatch { expected: usize, actual: usize },

    #[error("Vectors must have at least one dimension")]
    ZeroDimension,

    #[error("Index construction failed: {0}")]
    Shape(String),
}

/// Search result with position and similarity score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Row of the matched vector, which is also the chunk index
    pub index: usize,
    /// Inner product with the query (cosine similarity when normalized)
    pub score: f32,
}

/// Brute-force vector index over a dense row-major matrix
///
/// Row `i` holds the vector of chunk `i`. Search scores every row with one
/// matrix-vector product, so results are exact. Immutable once built; a new
/// document gets a new index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    vectors: Array2<f32>,
    normalized: bool,
}

impl VectorIndex {
    /// Build an index over `vectors`, preserving their order
    ///
    /// The dimension is taken from the first vector; every other vector must
    /// match it. With `normalize` set, rows are scaled to unit length and
    /// queries are normalized before scoring.
    pub fn build(vectors: Vec<Vec<f32>>, normalize: bool) -> Result<Self, VectorIndexError> {
        Self::assemble(vectors, normalize, normalize)
    }

    /// Rebuild an index from rows previously taken out of one with [`to_vectors`]
    ///
    /// Rows are stored as given; `normalized` only controls query handling,
    /// so persisted rows round-trip bit for bit.
    ///
    /// [`to_vectors`]: VectorIndex::to_vectors
    pub fn from_stored(vectors: Vec<Vec<f32>>, normalized: bool) -> Result<Self, VectorIndexError> {
        Self::assemble(vectors, false, normalized)
    }

    fn assemble(
        vectors: Vec<Vec<f32>>,
        normalize_rows: bool,
        normalized: bool,
    ) -> Result<Self, VectorIndexError> {
        let Some(first) = vectors.first() else {
            return Ok(Self::empty(normalized));
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(VectorIndexError::ZeroDimension);
        }

        if let Some((position, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != dimension)
        {
            return Err(VectorIndexError::DimensionMismatch {
                position,
                expected: dimension,
                actual: vector.len(),
            });
        }

        let rows = vectors.len();
        let mut flat = Vec::with_capacity(rows * dimension);
        for mut vector in vectors {
            if normalize_rows {
                l2_normalize(&mut vector);
            }
            flat.extend_from_slice(&vector);
        }

        let vectors = Array2::from_shape_vec((rows, dimension), flat)
            .map_err(|e| VectorIndexError::Shape(e.to_string()))?;

        tracing::debug!("Built vector index: {} vectors x {}D", rows, dimension);

        Ok(Self {
            vectors,
            normalized,
        })
    }

    /// An index with no vectors
    pub fn empty(normalize: bool) -> Self {
        Self {
            vectors: Array2::zeros((0, 0)),
            normalized: normalize,
        }
    }

    /// Find the `k` vectors with the highest inner product to `query`
    ///
    /// Results are sorted by descending score, ties by ascending index. If
    /// `k` exceeds the number of vectors, all of them are returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if query.len() != self.dimension() {
            return Err(VectorIndexError::QueryDimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        if self.normalized {
            l2_normalize(&mut query);
        }

        let scores = self.vectors.dot(&Array1::from(query));

        let mut results: Vec<SearchResult> = scores
            .iter()
            .enumerate()
            .map(|(index, &score)| SearchResult { index, score })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
        results.truncate(k);

        Ok(results)
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension (0 for an empty index)
    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// Whether stored vectors and queries are unit-normalized
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Copy the stored rows out as owned vectors
    pub fn to_vectors(&self) -> Vec<Vec<f32>> {
        self.vectors.rows().into_iter().map(|row| row.to_vec()).collect()
    }
}
