//! Hit deduplication by document ID

use crate::retrieval::ScoredId;
use std::collections::HashSet;

/// Deduplicate hits by document id, keeping the first instance
///
/// Callers sort best-first beforehand, so the surviving instance is the
/// highest-scored one and the relative order is preserved.
pub fn deduplicate_hits(hits: Vec<ScoredId>) -> Vec<ScoredId> {
    let mut seen = HashSet::new();

    hits.into_iter()
        .filter(|(id, _)| seen.insert(id.clone()))
        .collect()
}
