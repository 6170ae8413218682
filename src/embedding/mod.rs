mod batch;
mod keyword_index;
/// Embedding & Indexing
///
/// Concrete collaborators for the two retrieval branches:
/// - EmbeddingProvider trait with a local FastEmbed implementation
/// - HNSW vector index (cosine distance) behind `EmbeddingVectorSearch`
/// - Tantivy BM25 keyword index behind `KeywordSearcher`
/// - Batch processing to populate both indices from a corpus
mod provider;
mod vector_index;

pub use batch::{BatchProcessor, BatchResult};
pub use keyword_index::{KeywordIndex, KeywordIndexError, KeywordSearcher};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{EmbeddingVectorSearch, HnswParams, VectorIndex, VectorIndexError};

use crate::config::IndexingConfig;

impl From<&IndexingConfig> for HnswParams {
    fn from(config: &IndexingConfig) -> Self {
        Self {
            dimension: config.vector_dim,
            m: config.hnsw_m,
            ef_construction: config.hnsw_ef_construction,
            max_elements: config.hnsw_max_elements,
        }
    }
}
