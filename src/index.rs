//! Exact K-nearest-neighbor index over passage embeddings.
//!
//! Vectors are L2-normalized at build time so search reduces to a dot
//! product. An index is built fully before anyone can see it: the lifecycle
//! manager only publishes a corpus as ready once [`VectorIndex::build`]
//! returns, and readers hold the whole index behind an `Arc`, so a partially
//! built index is never visible.

use crate::error::IndexError;

/// Immutable similarity index over one corpus's passages. Row `i` holds the
/// embedding of the passage with sequence index `i`.
#[derive(Debug)]
pub struct VectorIndex {
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Build an index from per-passage embeddings, in sequence order.
    ///
    /// Fails on an empty corpus or inconsistent dimensionality — both
    /// indicate an upstream embedding bug and poison the whole build.
    pub fn build(embeddings: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dims = embeddings.first().map(|v| v.len()).ok_or(IndexError::EmptyCorpus)?;
        if dims == 0 {
            return Err(IndexError::Embedding("zero-dimensional embedding".to_string()));
        }

        let mut vectors = Vec::with_capacity(embeddings.len());
        for mut v in embeddings {
            if v.len() != dims {
                return Err(IndexError::DimensionMismatch {
                    expected: dims,
                    got: v.len(),
                });
            }
            normalize(&mut v);
            vectors.push(v);
        }

        Ok(Self { dims, vectors })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Top-`k` passages by similarity to the query vector.
    ///
    /// Returns `(sequence index, score)` pairs with scores clamped to
    /// `[0, 1]`, descending by score, ties broken by ascending sequence
    /// index for determinism.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dims || k == 0 {
            return Vec::new();
        }

        let mut q = query.to_vec();
        normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(seq, v)| {
                let dot: f32 = v.iter().zip(q.iter()).map(|(a, b)| a * b).sum();
                (seq, dot.clamp(0.0, 1.0))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}
