//! Capability traits for the external services the pipeline calls
//!
//! Any lexical index, vector index, cross-encoder or language model can be
//! plugged in behind these traits.

use crate::document::DocumentId;
use async_trait::async_trait;
use thiserror::Error;

/// A scored hit from a search collaborator
pub type ScoredId = (DocumentId, f32);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Failed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl CollaboratorError {
    /// Whether repeating the call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// How a vector collaborator orders its scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    /// Higher is closer
    Similarity,
    /// Lower is closer
    Distance,
}

/// Lexical (keyword) search over a term index
#[async_trait]
pub trait LexicalSearch: Send + Sync {
    /// Return up to `count` hits, best first
    async fn search(&self, text: &str, count: usize) -> Result<Vec<ScoredId>, CollaboratorError>;
}

/// Similarity search over document embeddings
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Embed `text` and return up to `count` nearest documents
    async fn search(&self, text: &str, count: usize) -> Result<Vec<ScoredId>, CollaboratorError>;

    fn score_kind(&self) -> ScoreKind {
        ScoreKind::Similarity
    }
}

/// Cross-encoder style scorer: one relevance score per document, aligned by index
#[async_trait]
pub trait RerankScorer: Send + Sync {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, CollaboratorError>;
}

/// Language model used to rewrite queries
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn complete(&self, instruction: &str, text: &str) -> Result<String, CollaboratorError>;
}
