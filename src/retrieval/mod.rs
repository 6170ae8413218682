//! Hybrid Retrieval: sparse + dense search, rank fusion, reranking
//!
//! This module implements the retrieval pipeline: optional query rewriting,
//! concurrent lexical and vector search, Reciprocal Rank Fusion and optional
//! cross-encoder reranking, degrading gracefully when collaborators fail.

mod candidate;
mod collaborator;
mod deduplication;
mod dense;
mod fusion;
mod hybrid;
mod provenance;
mod reformulation;
mod reranker;
mod sparse;

pub(crate) use candidate::by_score_desc;
pub use candidate::{rank_hits, Branch, Candidate};
pub use collaborator::{
    CollaboratorError, LexicalSearch, QueryRewriter, RerankScorer, ScoreKind, ScoredId,
    VectorSearch,
};
pub use deduplication::deduplicate_hits;
pub use dense::DenseRetriever;
pub use fusion::{FusedResult, FusionError, ReciprocalRankFusion};
pub use hybrid::{HybridRetriever, PipelineState, RetrievalMetadata, RetrievalResponse};
pub use provenance::{Provenance, RankedResult, ResolvedCandidate, ScoreSource};
pub use reformulation::{QueryReformulator, HISTORY_WINDOW, REFORMULATION_INSTRUCTION};
pub use reranker::{truncate_fused, CrossEncoderReranker, RerankError, Reranker};
pub use sparse::SparseRetriever;

/// Upper bound on candidates requested from either branch per query
pub const MAX_BRANCH_FETCH: usize = 10_000;

use crate::config::RetrievalConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Request parameters violate the contract; raised before any I/O
    #[error("Invalid request: {field}: {message}")]
    InvalidRequest { field: &'static str, message: String },

    /// Pipeline could not be constructed from its configuration
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfiguration(String),

    /// Neither branch produced candidates
    #[error("Total retrieval failure: sparse branch {sparse}; dense branch {dense}")]
    TotalRetrievalFailure { sparse: String, dense: String },
}

impl RetrievalError {
    /// Whether this is a caller-side contract violation rather than a runtime failure
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. } | Self::InvalidConfiguration(_)
        )
    }
}

/// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A prior conversation turn, used as rewrite context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

/// Retrieval request; unset fields fall back to the service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Query text
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefetch_ratio: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_rerank: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_query_reformulation: Option<bool>,

    /// Recent conversation turns, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatMessage>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = Some(top_n);
        self
    }

    pub fn with_prefetch_ratio(mut self, ratio: f32) -> Self {
        self.prefetch_ratio = Some(ratio);
        self
    }

    pub fn with_rerank(mut self, use_rerank: bool) -> Self {
        self.use_rerank = Some(use_rerank);
        self
    }

    pub fn with_reformulation(mut self, enabled: bool) -> Self {
        self.enable_query_reformulation = Some(enabled);
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// Validated per-request settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuerySettings {
    pub top_k: usize,
    pub top_n: usize,
    pub prefetch_ratio: f32,
    pub use_rerank: bool,
    pub enable_query_reformulation: bool,
}

impl QuerySettings {
    /// Merge request overrides onto service defaults and check the contract
    pub fn resolve(
        request: &RetrievalRequest,
        defaults: &RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        if request.query.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest {
                field: "query",
                message: "must not be empty".to_string(),
            });
        }

        let settings = Self {
            top_k: request.top_k.unwrap_or(defaults.top_k),
            top_n: request.top_n.unwrap_or(defaults.top_n),
            prefetch_ratio: request.prefetch_ratio.unwrap_or(defaults.prefetch_ratio),
            use_rerank: request.use_rerank.unwrap_or(defaults.use_rerank),
            enable_query_reformulation: request
                .enable_query_reformulation
                .unwrap_or(defaults.enable_query_reformulation),
        };

        if settings.top_k < 1 {
            return Err(RetrievalError::InvalidRequest {
                field: "top_k",
                message: format!("must be >= 1, got {}", settings.top_k),
            });
        }

        if settings.top_k > MAX_BRANCH_FETCH {
            return Err(RetrievalError::InvalidRequest {
                field: "top_k",
                message: format!("must be <= {}, got {}", MAX_BRANCH_FETCH, settings.top_k),
            });
        }

        if settings.top_n < 1 || settings.top_n > settings.top_k {
            return Err(RetrievalError::InvalidRequest {
                field: "top_n",
                message: format!(
                    "must be between 1 and top_k ({}), got {}",
                    settings.top_k, settings.top_n
                ),
            });
        }

        if !settings.prefetch_ratio.is_finite() || settings.prefetch_ratio < 1.0 {
            return Err(RetrievalError::InvalidRequest {
                field: "prefetch_ratio",
                message: format!("must be >= 1.0, got {}", settings.prefetch_ratio),
            });
        }

        if settings.raw_prefetch() > MAX_BRANCH_FETCH as f64 {
            return Err(RetrievalError::InvalidRequest {
                field: "prefetch_ratio",
                message: format!(
                    "top_k * prefetch_ratio must be <= {}, got {} * {}",
                    MAX_BRANCH_FETCH, settings.top_k, settings.prefetch_ratio
                ),
            });
        }

        Ok(settings)
    }

    fn raw_prefetch(&self) -> f64 {
        ((self.top_k as f64) * (self.prefetch_ratio as f64)).round()
    }

    /// Per-branch fetch count: round(top_k * prefetch_ratio), at most
    /// `MAX_BRANCH_FETCH`
    pub fn prefetch_count(&self) -> usize {
        (self.raw_prefetch() as usize).min(MAX_BRANCH_FETCH)
    }
}

/// One retrieval request's query, immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct Query {
    pub raw_text: String,

    /// Set only when a rewrite succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reformulated_text: Option<String>,

    pub settings: QuerySettings,
}

impl Query {
    /// Text used for retrieval
    pub fn text(&self) -> &str {
        self.reformulated_text.as_deref().unwrap_or(&self.raw_text)
    }
}
