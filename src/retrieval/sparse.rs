//! Sparse (lexical) retrieval branch

use crate::retrieval::{rank_hits, Branch, Candidate, CollaboratorError, LexicalSearch};
use std::sync::Arc;
use tracing::debug;

/// Adapts a lexical index to the candidate shape used by fusion
#[derive(Clone)]
pub struct SparseRetriever {
    index: Arc<dyn LexicalSearch>,
}

impl SparseRetriever {
    pub fn new(index: Arc<dyn LexicalSearch>) -> Self {
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

        let candidates = rank_hits(hits, count, Branch::Sparse);

        debug!(
            "Sparse branch: {} hits returned, {} candidates kept (cap {})",
            returned,
            candidates.len(),
            count
        );

        Ok(candidates)
    }
}
