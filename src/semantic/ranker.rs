//! Similarity ranking over the embedding store.
//!
//! Scores every entry with cosine similarity and returns a total ordering.
//! Ranking is exact (O(n·d)); the [`Ranker`] trait is the seam for plugging in an
//! approximate index later without changing what callers see.

use crate::semantic::store::{EmbeddingStore, StyleEntry};

/// Errors that can occur while ranking.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// One scored store entry.
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    /// Position of the entry in store order
    pub position: usize,
    pub entry: &'a StyleEntry,
    /// Cosine similarity (-1.0 to 1.0)
    pub score: f32,
}

impl Ranked<'_> {
    pub fn code(&self) -> &str {
        &self.entry.code
    }
}

pub trait Ranker: Send + Sync {
    /// Rank every entry of `store` against `query`, best first.
    ///
    /// The entry whose code equals `exclude` never appears in the output.
    /// Entries with equal scores keep their store order.
    fn rank<'s>(
        &self,
        query: &[f32],
        store: &'s EmbeddingStore,
        exclude: Option<&str>,
    ) -> Result<Vec<Ranked<'s>>, RankError>;
}

/// Brute-force cosine ranker.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactRanker;

impl Ranker for ExactRanker {
    fn rank<'s>(
        &self,
        query: &[f32],
        store: &'s EmbeddingStore,
        exclude: Option<&str>,
    ) -> Result<Vec<Ranked<'s>>, RankError> {
        if store.is_empty() {
            return Ok(vec![]);
        }

        if query.len() != store.dimensions() {
            return Err(RankError::DimensionMismatch {
                expected: store.dimensions(),
                got: query.len(),
            });
        }

        let query_norm = l2_norm(query);

        let mut results: Vec<Ranked<'s>> = store
            .all_entries()
            .iter()
            .enumerate()
            .filter(|(_, entry)| exclude.map_or(true, |code| entry.code != code))
            .map(|(position, entry)| Ranked {
                position,
                entry,
                score: cosine_with_norm(query, query_norm, &entry.embedding),
            })
            .collect();

        // Stable sort: equal scores stay in store order
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(results)
    }
}

/// Cosine similarity between two vectors of equal length.
///
/// If either vector has zero magnitude the similarity is defined as `0.0`.
/// Sums run in `f64`, which holds the square of any finite `f32` without
/// overflow or underflow, so the score does not depend on vector scale.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norm(a, l2_norm(a), b)
}

fn cosine_with_norm(query: &[f32], query_norm: f64, target: &[f32]) -> f32 {
    let target_norm = l2_norm(target);
    if query_norm == 0.0 || target_norm == 0.0 {
        return 0.0;
    }

    let dot_product: f64 = query
        .iter()
        .zip(target.iter())
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum();
    let score = (dot_product / (query_norm * target_norm)).clamp(-1.0, 1.0);

    // NaN only comes from a non-finite query
    if score.is_nan() {
        0.0
    } else {
        score as f32
    }
}

fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt()
}
