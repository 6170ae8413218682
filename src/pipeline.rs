//! Assemble a ready-to-query `HybridRetriever` from configuration and a corpus

use crate::config::Config;
use crate::document::{DocumentStore, InMemoryDocumentStore};
use crate::embedding::{
    BatchProcessor, EmbeddingProvider, EmbeddingVectorSearch, FastEmbedProvider, HnswParams,
    KeywordIndex, VectorIndex,
};
use crate::error::{NewsfuseError, Result};
use crate::llm::OpenAiRewriter;
use crate::retrieval::{CrossEncoderReranker, HybridRetriever};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Which optional collaborators to load
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub reranker: bool,
    pub rewriter: bool,
}

impl BuildOptions {
    /// Load whatever the configuration enables by default
    pub fn from_config(config: &Config) -> Self {
        Self {
            reranker: config.retrieval.use_rerank,
            rewriter: config.retrieval.enable_query_reformulation,
        }
    }
}

/// Load the corpus, index it and wire up every collaborator
///
/// Optional collaborators that fail to load are left out with a warning; the
/// pipeline then reports those stages as failed per request.
pub async fn build(
    config: &Config,
    corpus: &Path,
    options: BuildOptions,
) -> Result<HybridRetriever> {
    let store = InMemoryDocumentStore::from_jsonl(corpus)?;
    if store.is_empty() {
        return Err(NewsfuseError::Corpus {
            path: corpus.to_path_buf(),
            line: 0,
            message: "Corpus contains no documents".to_string(),
        });
    }

    let model = config.embedding.model.clone();
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(
        tokio::task::spawn_blocking(move || FastEmbedProvider::new(&model))
            .await
            .map_err(|e| NewsfuseError::Other(e.into()))?
            .map_err(|e| NewsfuseError::Config(e.to_string()))?,
    );

    if provider.dimension() != config.indexing.vector_dim {
        return Err(NewsfuseError::InvalidConfigValue {
            path: "indexing.vector_dim".to_string(),
            message: format!(
                "Model {} produces {}-dimensional vectors, index expects {}",
                provider.model_name(),
                provider.dimension(),
                config.indexing.vector_dim
            ),
        });
    }

    let vector_index = VectorIndex::new(HnswParams::from(&config.indexing));
    let keyword_index = match &config.indexing.keyword_dir {
        Some(dir) => KeywordIndex::open_or_create(dir),
        None => KeywordIndex::in_ram(),
    }
    .map_err(|e| NewsfuseError::Other(e.into()))?;
    let keyword_index = Arc::new(Mutex::new(keyword_index));

    let processor = BatchProcessor::new(
        provider.clone(),
        vector_index.clone(),
        keyword_index.clone(),
        config.embedding.batch_size,
        config.embedding.max_concurrent,
    );
    let documents: Vec<_> = store.documents().cloned().collect();
    let indexed = processor.process(documents).await?;

    info!(
        "Indexed {} documents ({} failed) in {}ms",
        indexed.processed, indexed.failed, indexed.duration_ms
    );

    let sparse = Arc::new(keyword_index.lock().await.searcher());
    let dense = Arc::new(EmbeddingVectorSearch::new(
        provider,
        vector_index,
        config.indexing.hnsw_ef_search,
    ));

    let mut retriever =
        HybridRetriever::new(sparse, dense, Arc::new(store), config.retrieval.clone())?;

    if options.reranker {
        let model = config.reranker.model.clone();
        let loaded = tokio::task::spawn_blocking(move || CrossEncoderReranker::new(&model))
            .await
            .map_err(|e| NewsfuseError::Other(e.into()))?;

        match loaded {
            Ok(reranker) => retriever = retriever.with_reranker(Arc::new(reranker)),
            Err(e) => warn!("Reranker unavailable, results will keep fusion order: {}", e),
        }
    }

    if options.rewriter {
        match OpenAiRewriter::from_config(
            &config.reformulation,
            config.retrieval.timeouts.reformulation,
        ) {
            Ok(rewriter) => retriever = retriever.with_rewriter(Arc::new(rewriter)),
            Err(e) => warn!("Query rewriter unavailable, raw queries will be used: {}", e),
        }
    }

    Ok(retriever)
}
