//! Cross-encoder reranking of fused candidates

use crate::retrieval::provenance::ResolvedCandidate;
use crate::retrieval::{by_score_desc, CollaboratorError, RankedResult, RerankScorer};
use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Unsupported reranker model: {0}")]
    UnsupportedModel(String),
}

/// Re-scores resolved candidates with a higher-precision scorer
#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn RerankScorer>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RerankScorer>) -> Self {
        Self { scorer }
    }

    /// Rerank candidates against the query
    ///
    /// # Arguments
    /// * `query` - Query text given to the scorer
    /// * `candidates` - Fused candidates with resolved documents
    /// * `top_n` - Number of results to keep
    ///
    /// # Returns
    /// Results sorted by rerank score descending (ties by ascending id),
    /// truncated to `top_n`, marked as rerank-scored
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[ResolvedCandidate],
        top_n: usize,
    ) -> Result<Vec<RankedResult>, CollaboratorError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = candidates
            .iter()
            .map(|c| c.document.text.clone())
            .collect();

        let scores = self.scorer.score(query, &texts).await?;

        if scores.len() != candidates.len() {
            return Err(CollaboratorError::InvalidResponse(format!(
                "Expected {} scores, got {}",
                candidates.len(),
                scores.len()
            )));
        }

        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(CollaboratorError::InvalidResponse(format!(
                "Non-finite rerank score: {}",
                bad
            )));
        }

        let mut scored: Vec<(&ResolvedCandidate, f32)> =
            candidates.iter().zip(scores).collect();
        scored.sort_by(|a, b| {
            by_score_desc(a.1, b.1)
                .then_with(|| a.0.fused.document_id.cmp(&b.0.fused.document_id))
        });

        Ok(scored
            .into_iter()
            .take(top_n)
            .enumerate()
            .map(|(idx, (candidate, score))| {
                RankedResult::from_rerank(
                    &candidate.fused,
                    candidate.document.clone(),
                    score,
                    idx + 1,
                )
            })
            .collect())
    }
}

/// Fusion-ordered truncation used when reranking is off or failed
pub fn truncate_fused(candidates: &[ResolvedCandidate], top_n: usize) -> Vec<RankedResult> {
    candidates
        .iter()
        .take(top_n)
        .enumerate()
        .map(|(idx, c)| RankedResult::from_fusion(&c.fused, c.document.clone(), idx + 1))
        .collect()
}

/// Local cross-encoder scorer backed by FastEmbed
pub struct CrossEncoderReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl CrossEncoderReranker {
    /// Create a new reranker with specified model
    ///
    /// # Arguments
    /// * `model_name` - Model name (e.g., "BAAI/bge-reranker-base")
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        let model = match model_name {
            "BAAI/bge-reranker-base" | "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "BAAI/bge-reranker-v2-m3" | "bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            "jinaai/jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
            _ => return Err(RerankError::UnsupportedModel(model_name.to_string())),
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options = RerankInitOptions::new(model).with_show_download_progress(true);

        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }

    /// Create reranker with default model
    pub fn with_default_model() -> Result<Self, RerankError> {
        Self::new("BAAI/bge-reranker-base")
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl RerankScorer for CrossEncoderReranker {
    async fn score(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<f32>, CollaboratorError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let query = query.to_string();
        let documents = documents.to_vec();
        let expected = documents.len();

        // Inference is CPU bound; keep it off the async workers
        let results =
            tokio::task::spawn_blocking(move || model.rerank(query, documents, false, None))
                .await
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

        let mut aligned = vec![None; expected];
        for result in results {
            let slot = aligned.get_mut(result.index).ok_or_else(|| {
                CollaboratorError::InvalidResponse(format!(
                    "Result index {} out of range",
                    result.index
                ))
            })?;
            *slot = Some(result.score);
        }

        aligned
            .into_iter()
            .enumerate()
            .map(|(idx, score)| {
                score.ok_or_else(|| {
                    CollaboratorError::InvalidResponse(format!(
                        "Missing score for document {}",
                        idx
                    ))
                })
            })
            .collect()
    }
}
