//! Per-branch candidates and the shared ranking rule for both branches

use crate::document::DocumentId;
use crate::retrieval::{deduplicate_hits, ScoredId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Retrieval branch a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Sparse,
    Dense,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sparse => f.write_str("sparse"),
            Self::Dense => f.write_str("dense"),
        }
    }
}

/// A document scored by a single retrieval branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub document_id: DocumentId,

    /// Branch-specific score, higher is more relevant
    pub branch_score: f32,

    /// 1-based position within the branch list
    pub branch_rank: usize,

    pub branch: Branch,
}

/// Order scores descending with NaN last; -0.0 and 0.0 compare equal
pub(crate) fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Turn raw collaborator hits into a ranked candidate list
///
/// Sorts by descending score with ties broken by ascending document id,
/// collapses duplicate ids, caps the list at `count` and assigns ranks 1..n.
pub fn rank_hits(mut hits: Vec<ScoredId>, count: usize, branch: Branch) -> Vec<Candidate> {
    hits.sort_by(|a, b| by_score_desc(a.1, b.1).then_with(|| a.0.cmp(&b.0)));

    deduplicate_hits(hits)
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(idx, (document_id, branch_score))| Candidate {
            document_id,
            branch_score,
            branch_rank: idx + 1,
            branch,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(items: &[(&str, f32)]) -> Vec<ScoredId> {
        items
            .iter()
            .map(|(id, score)| (DocumentId::from(*id), *score))
            .collect()
    }

    #[test]
    fn test_rank_hits_orders_and_ranks() {
        let ranked = rank_hits(hits(&[("c", 5.0), ("a", 10.0), ("b", 8.0)]), 10, Branch::Sparse);

        let ids: Vec<&str> = ranked.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(ranked[0].branch_rank, 1);
        assert_eq!(ranked[2].branch_rank, 3);
        assert!(ranked.iter().all(|c| c.branch == Branch::Sparse));
    }

    #[test]
    fn test_rank_hits_tie_break_by_id() {
        let ranked = rank_hits(hits(&[("z", 1.0), ("m", 1.0), ("a", 1.0)]), 10, Branch::Dense);

        let ids: Vec<&str> = ranked.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_rank_hits_caps_count() {
        let ranked = rank_hits(hits(&[("a", 3.0), ("b", 2.0), ("c", 1.0)]), 2, Branch::Sparse);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].document_id.as_str(), "b");
    }

    #[test]
    fn test_rank_hits_collapses_duplicates_and_sinks_nan() {
        let ranked = rank_hits(
            hits(&[("a", 1.0), ("n", f32::NAN), ("a", 4.0), ("b", 2.0)]),
            10,
            Branch::Sparse,
        );

        let ids: Vec<&str> = ranked.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "n"]);
        assert_eq!(ranked[0].branch_score, 4.0);
        assert_eq!(ranked[2].branch_rank, 3);
    }

    #[test]
    fn test_rank_hits_empty() {
        assert!(rank_hits(Vec::new(), 5, Branch::Dense).is_empty());
    }
}
