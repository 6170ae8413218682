//! Dense (embedding similarity) retrieval branch

use crate::retrieval::{
    rank_hits, Branch, Candidate, CollaboratorError, ScoreKind, ScoredId, VectorSearch,
};
use std::sync::Arc;
use tracing::debug;

/// Adapts a vector index to the candidate shape used by fusion
///
/// Distance-reporting collaborators are negated so that, as in the sparse
/// branch, a higher score always means more relevant.
#[derive(Clone)]
pub struct DenseRetriever {
    index: Arc<dyn VectorSearch>,
}

impl DenseRetriever {
    pub fn new(index: Arc<dyn VectorSearch>) -> Self {
        Self { index }
    }

    /// Fetch up to `count` candidates, best first, ranked 1..n
    pub async fn retrieve(
        &self,
        query_text: &str,
        count: usize,
    ) -> Result<Vec<Candidate>, CollaboratorError> {
        let hits = self.index.search(query_text, count).await?;
        let returned = hits.len();

        let hits = match self.index.score_kind() {
            ScoreKind::Similarity => hits,
            ScoreKind::Distance => invert_distances(hits),
        };

        let candidates = rank_hits(hits, count, Branch::Dense);

        debug!(
            "Dense branch: {} hits returned, {} candidates kept (cap {})",
            returned,
            candidates.len(),
            count
        );

        Ok(candidates)
    }
}

fn invert_distances(hits: Vec<ScoredId>) -> Vec<ScoredId> {
    hits.into_iter()
        .map(|(id, distance)| (id, -distance))
        .collect()
}
