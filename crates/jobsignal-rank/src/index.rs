//! Exhaustive inner-product index over one batch of job vectors.
//!
//! Batches are small (a few dozen postings), so the index is a flat list that
//! is rebuilt wholesale whenever the batch changes. There is no incremental
//! insert or delete: a snapshot is either the whole batch or nothing.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{RankError, Result};

/// Largest allowed distance of a stored vector's norm from 1.0.
pub const NORM_TOLERANCE: f32 = 1e-3;

/// Flat vector index.
///
/// `build` validates every entry before replacing the current snapshot, so a
/// failed build leaves the previous snapshot queryable.
#[derive(Debug, Default)]
pub struct VectorIndex {
    snapshot: Option<Snapshot>,
    generation: u64,
}

#[derive(Debug)]
struct Snapshot {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
    batch_key: String,
}

impl VectorIndex {
    /// Create an empty, unbuilt index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the index with `entries`.
    ///
    /// # Errors
    /// `RankError::IndexBuild` if `entries` is empty, has duplicate ids, mixes
    /// dimensions, or holds a vector whose norm is not within
    /// [`NORM_TOLERANCE`] of 1.
    pub fn build(&mut self, entries: Vec<(String, Vec<f32>)>) -> Result<()> {
        if entries.is_empty() {
            return Err(RankError::IndexBuild("no vectors to index".into()));
        }

        let dimension = entries[0].1.len();
        if dimension == 0 {
            return Err(RankError::IndexBuild(format!(
                "vector for '{}' is empty",
                entries[0].0
            )));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        let mut ids = Vec::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len());

        for (id, vector) in entries {
            if !seen.insert(id.clone()) {
                return Err(RankError::IndexBuild(format!("duplicate id '{}'", id)));
            }
            if vector.len() != dimension {
                return Err(RankError::IndexBuild(format!(
                    "vector for '{}' has dimension {}, expected {}",
                    id,
                    vector.len(),
                    dimension
                )));
            }
            let norm = l2_norm(&vector);
            if !norm.is_finite() || (norm - 1.0).abs() > NORM_TOLERANCE {
                return Err(RankError::IndexBuild(format!(
                    "vector for '{}' is not unit-normalized (norm {})",
                    id, norm
                )));
            }
            ids.push(id);
            vectors.push(vector);
        }

        let batch_key = batch_key(&ids);
        self.generation += 1;
        debug!(
            entries = ids.len(),
            dimension,
            generation = self.generation,
            "Built vector index"
        );
        self.snapshot = Some(Snapshot {
            ids,
            vectors,
            dimension,
            batch_key,
        });
        Ok(())
    }

    /// Cosine similarity of `query` against every indexed vector.
    ///
    /// Returns one `(id, score)` per entry, in build order, scores in [-1,1].
    /// The query is normalized here; callers may pass raw vectors.
    pub fn similarity(&self, query: &[f32]) -> Result<Vec<(String, f32)>> {
        let snapshot = self.snapshot.as_ref().ok_or(RankError::IndexNotBuilt)?;

        if query.len() != snapshot.dimension {
            return Err(RankError::DimensionMismatch {
                expected: snapshot.dimension,
                actual: query.len(),
            });
        }
        let query = normalize_l2(query)?;

        Ok(snapshot
            .ids
            .iter()
            .zip(&snapshot.vectors)
            .map(|(id, vector)| (id.clone(), dot(&query, vector).clamp(-1.0, 1.0)))
            .collect())
    }

    pub fn is_built(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of indexed vectors (0 before the first build).
    pub fn len(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.ids.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.ids.iter().any(|i| i == id))
    }

    /// Vector dimension of the current snapshot.
    pub fn dimension(&self) -> Option<usize> {
        self.snapshot.as_ref().map(|s| s.dimension)
    }

    /// Successful builds so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fingerprint of the ids in the current snapshot.
    pub fn batch_key(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.batch_key.as_str())
    }
}

/// SHA-256 over the ordered ids, hex encoded.
pub fn batch_key<I, S>(ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_ref().as_bytes());
        // Separator keeps ["ab","c"] distinct from ["a","bc"].
        hasher.update([0u8]);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Scale `vector` to unit length.
///
/// # Errors
/// `RankError::InvalidVector` for an empty, zero or non-finite vector.
pub fn normalize_l2(vector: &[f32]) -> Result<Vec<f32>> {
    let norm = l2_norm(vector);
    if vector.is_empty() || !norm.is_finite() || norm == 0.0 {
        return Err(RankError::InvalidVector(format!(
            "cannot normalize vector of length {} with norm {}",
            vector.len(),
            norm
        )));
    }
    Ok(vector.iter().map(|v| v / norm).collect())
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
