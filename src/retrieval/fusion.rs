//! Reciprocal Rank Fusion algorithm for combining search results
//!
//! Sparse scores (BM25, unbounded and corpus dependent) and dense scores
//! (bounded similarity) live on unrelated scales, so only ranks are fused.

use crate::config::DEFAULT_RRF_K;
use crate::document::DocumentId;
use crate::retrieval::{Branch, Candidate};
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid RRF constant {0}: must be positive and finite")]
    InvalidK(f32),
}

/// A document after fusion, with the branch ranks that produced its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub document_id: DocumentId,

    /// Comparable only within one fusion run
    pub fused_score: f64,

    /// 1-based position after fusion
    pub fused_rank: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_rank: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_rank: Option<usize>,
}

#[derive(Default)]
struct Accumulated {
    score: f64,
    sparse_rank: Option<usize>,
    dense_rank: Option<usize>,
}

/// Reciprocal Rank Fusion with a fixed smoothing constant
///
/// RRF formula: score(id) = sum over all rankings of: 1 / (k + rank)
#[derive(Debug, Clone, Copy)]
pub struct ReciprocalRankFusion {
    k: f64,
}

impl Default for ReciprocalRankFusion {
    fn default() -> Self {
        Self {
            k: DEFAULT_RRF_K as f64,
        }
    }
}

impl ReciprocalRankFusion {
    pub fn new(k: f32) -> Result<Self, FusionError> {
        if !k.is_finite() || k <= 0.0 {
            return Err(FusionError::InvalidK(k));
        }

        Ok(Self { k: k as f64 })
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Contribution of a single 1-based rank
    pub fn contribution(&self, rank: usize) -> f64 {
        1.0 / (self.k + rank as f64)
    }

    /// Fuse the two branch lists
    ///
    /// # Arguments
    /// * `sparse` - Ranked candidates from the lexical branch
    /// * `dense` - Ranked candidates from the vector branch
    /// * `limit` - Maximum number of fused results to keep
    ///
    /// # Returns
    /// Fused results sorted by score descending, ties by ascending id,
    /// with ranks 1..m assigned
    pub fn fuse(
        &self,
        sparse: &[Candidate],
        dense: &[Candidate],
        limit: usize,
    ) -> Vec<FusedResult> {
        let mut scores: HashMap<&DocumentId, Accumulated> =
            HashMap::with_capacity(sparse.len() + dense.len());

        for candidate in sparse.iter().chain(dense.iter()) {
            let entry = scores.entry(&candidate.document_id).or_default();
            entry.score += self.contribution(candidate.branch_rank);

            match candidate.branch {
                Branch::Sparse => entry.sparse_rank = Some(candidate.branch_rank),
                Branch::Dense => entry.dense_rank = Some(candidate.branch_rank),
            }
        }

        let mut fused: Vec<(&DocumentId, Accumulated)> = scores.into_iter().collect();
        fused.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then_with(|| a.0.cmp(b.0)));

        fused
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(idx, (document_id, acc))| FusedResult {
                document_id: document_id.clone(),
                fused_score: acc.score,
                fused_rank: idx + 1,
                sparse_rank: acc.sparse_rank,
                dense_rank: acc.dense_rank,
            })
            .collect()
    }
}
