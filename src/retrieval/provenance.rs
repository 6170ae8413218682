//! Provenance tracking and the externally visible ranked result

use crate::document::{Document, DocumentId};
use crate::retrieval::FusedResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which stage produced `final_score`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Fusion,
    Rerank,
}

/// How a result got its position: fused score plus the branch ranks behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub fused_score: f64,
    pub fused_rank: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_rank: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_rank: Option<usize>,
}

impl From<&FusedResult> for Provenance {
    fn from(fused: &FusedResult) -> Self {
        Self {
            fused_score: fused.fused_score,
            fused_rank: fused.fused_rank,
            sparse_rank: fused.sparse_rank,
            dense_rank: fused.dense_rank,
        }
    }
}

/// A resolved document with its final score and position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub document_id: DocumentId,

    pub document: Arc<Document>,

    pub final_score: f64,

    /// 1-based position in the response
    pub final_rank: usize,

    pub score_source: ScoreSource,

    pub provenance: Provenance,
}

impl RankedResult {
    /// Build a fusion-scored result
    pub fn from_fusion(fused: &FusedResult, document: Arc<Document>, final_rank: usize) -> Self {
        Self {
            document_id: fused.document_id.clone(),
            document,
            final_score: fused.fused_score,
            final_rank,
            score_source: ScoreSource::Fusion,
            provenance: Provenance::from(fused),
        }
    }

    /// Build a rerank-scored result
    pub fn from_rerank(
        fused: &FusedResult,
        document: Arc<Document>,
        rerank_score: f32,
        final_rank: usize,
    ) -> Self {
        Self {
            document_id: fused.document_id.clone(),
            document,
            final_score: rerank_score as f64,
            final_rank,
            score_source: ScoreSource::Rerank,
            provenance: Provenance::from(fused),
        }
    }
}

/// A fused result whose document has been resolved from the store
#[derive(Debug, Clone)]
pub struct ResolvedCandidate {
    pub fused: FusedResult,
    pub document: Arc<Document>,
}
