/// HNSW vector index for similarity search
use crate::document::DocumentId;
use crate::embedding::EmbeddingProvider;
use crate::retrieval::{CollaboratorError, ScoreKind, ScoredId, VectorSearch};
use ahash::{HashMap, HashMapExt};
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Upper bound on HNSW layers accepted by hnsw_rs
const MAX_LAYERS: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Document already indexed: {0}")]
    DuplicateId(DocumentId),

    #[error("Index capacity reached: {0} vectors")]
    CapacityExceeded(usize),

    #[error("Index lock poisoned")]
    LockPoisoned,
}

/// HNSW construction parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub dimension: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub max_elements: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            dimension: 384,
            m: 16,
            ef_construction: 200,
            max_elements: 100_000,
        }
    }
}

struct Inner {
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// HNSW slot -> document id
    ids: Vec<DocumentId>,
    positions: HashMap<DocumentId, usize>,
}

impl Inner {
    fn new(params: &HnswParams) -> Self {
        Self {
            hnsw: Hnsw::new(
                params.m,
                params.max_elements,
                MAX_LAYERS,
                params.ef_construction,
                DistCosine,
            ),
            ids: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

/// In-memory HNSW index keyed by document id
///
/// Reports cosine distance (lower is closer). Cheap to clone; clones share
/// the same index.
#[derive(Clone)]
pub struct VectorIndex {
    inner: Arc<RwLock<Inner>>,
    params: HnswParams,
}

impl VectorIndex {
    pub fn new(params: HnswParams) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::new(&params))),
            params,
        }
    }

    /// Insert one document vector
    pub fn insert(&self, id: &DocumentId, vector: &[f32]) -> Result<(), VectorIndexError> {
        self.check_dimension(vector)?;

        let mut inner = self.inner.write().map_err(|_| VectorIndexError::LockPoisoned)?;

        if inner.positions.contains_key(id) {
            return Err(VectorIndexError::DuplicateId(id.clone()));
        }

        let slot = inner.ids.len();
        if slot >= self.params.max_elements {
            return Err(VectorIndexError::CapacityExceeded(self.params.max_elements));
        }

        inner.hnsw.insert((vector, slot));
        inner.ids.push(id.clone());
        inner.positions.insert(id.clone(), slot);

        Ok(())
    }

    pub fn insert_batch(&self, items: &[(DocumentId, Vec<f32>)]) -> Result<(), VectorIndexError> {
        for (id, vector) in items {
            self.insert(id, vector)?;
        }
        Ok(())
    }

    /// Nearest neighbours of `query`
    ///
    /// # Returns
    /// `(id, cosine distance)` pairs, closest first
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<ScoredId>, VectorIndexError> {
        self.check_dimension(query)?;

        let inner = self.inner.read().map_err(|_| VectorIndexError::LockPoisoned)?;

        // Never ask the graph for more neighbours than it holds
        let k = k.min(inner.ids.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let neighbours = inner.hnsw.search(query, k, ef_search.max(k));

        let mut hits: Vec<ScoredId> = neighbours
            .into_iter()
            .filter_map(|n| inner.ids.get(n.d_id).map(|id| (id.clone(), n.distance)))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(hits)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.inner
            .read()
            .map(|inner| inner.positions.contains_key(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.ids.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.params.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.params.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.params.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Dense branch collaborator: embeds the query and searches the HNSW index
#[derive(Clone)]
pub struct EmbeddingVectorSearch {
    provider: Arc<dyn EmbeddingProvider>,
    index: VectorIndex,
    ef_search: usize,
}

impl EmbeddingVectorSearch {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: VectorIndex, ef_search: usize) -> Self {
        Self {
            provider,
            index,
            ef_search,
        }
    }
}

#[async_trait]
impl VectorSearch for EmbeddingVectorSearch {
    async fn search(&self, text: &str, count: usize) -> Result<Vec<ScoredId>, CollaboratorError> {
        let provider = self.provider.clone();
        let index = self.index.clone();
        let ef_search = self.ef_search;
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let embedding = provider
                .embed(&text)
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

            index
                .search(&embedding, count, ef_search)
                .map_err(|e| CollaboratorError::Failed(e.to_string()))
        })
        .await
        .map_err(|e| CollaboratorError::Failed(e.to_string()))?
    }

    fn score_kind(&self) -> ScoreKind {
        ScoreKind::Distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;

    fn params(dimension: usize) -> HnswParams {
        HnswParams {
            dimension,
            max_elements: 1_000,
            ..HnswParams::default()
        }
    }

    fn axis(dimension: usize, hot: &[(usize, f32)]) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        for (i, x) in hot {
            v[*i] = *x;
        }
        v
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new(params(8));

        index.insert(&"x".into(), &axis(8, &[(0, 1.0)])).unwrap();
        index.insert(&"y".into(), &axis(8, &[(1, 1.0)])).unwrap();
        index.insert(&"xy".into(), &axis(8, &[(0, 0.9), (1, 0.1)])).unwrap();

        assert_eq!(index.len(), 3);

        let hits = index.search(&axis(8, &[(0, 1.0)]), 2, 50).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.as_str(), "x");
        assert!(hits[0].1 < 0.01);
        assert_eq!(hits[1].0.as_str(), "xy");
        assert!(hits[0].1 <= hits[1].1);
    }

    #[test]
    fn test_duplicate_and_dimension_checks() {
        let index = VectorIndex::new(params(4));
        let id = DocumentId::from("a");

        index.insert(&id, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(index.contains(&id));
        assert!(matches!(
            index.insert(&id, &[0.0, 1.0, 0.0, 0.0]),
            Err(VectorIndexError::DuplicateId(_))
        ));
        assert!(matches!(
            index.insert(&"b".into(), &[1.0; 3]),
            Err(VectorIndexError::InvalidDimension { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_capacity_limit() {
        let index = VectorIndex::new(HnswParams {
            dimension: 2,
            max_elements: 1,
            ..HnswParams::default()
        });

        index.insert(&"a".into(), &[1.0, 0.0]).unwrap();
        assert!(matches!(
            index.insert(&"b".into(), &[0.0, 1.0]),
            Err(VectorIndexError::CapacityExceeded(1))
        ));
    }

    #[test]
    fn test_oversized_k_is_capped() {
        let index = VectorIndex::new(params(2));
        assert!(index.search(&[1.0, 0.0], usize::MAX, 16).unwrap().is_empty());

        index.insert(&"a".into(), &[1.0, 0.0]).unwrap();
        index.insert(&"b".into(), &[0.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 100_000_000_000, 16).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.as_str(), "a");
    }

    /// Maps the first character onto one of two axes
    struct AxisEmbedder;

    impl EmbeddingProvider for AxisEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            match text.chars().next() {
                Some('o') => Ok(vec![1.0, 0.0]),
                Some(_) => Ok(vec![0.0, 1.0]),
                None => Err(EmbeddingError::InvalidInput("Empty text".to_string())),
            }
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    #[tokio::test]
    async fn test_embedding_vector_search() {
        let index = VectorIndex::new(params(2));
        index.insert(&"oil".into(), &[1.0, 0.0]).unwrap();
        index.insert(&"gold".into(), &[0.0, 1.0]).unwrap();

        let search = EmbeddingVectorSearch::new(Arc::new(AxisEmbedder), index, 16);

        let hits = search.search("opec output", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.as_str(), "oil");
        assert_eq!(search.score_kind(), ScoreKind::Distance);

        let err = search.search("", 1).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Failed(_)));
    }
}
