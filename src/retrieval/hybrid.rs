//! Hybrid retrieval orchestrator: rewrite, fan out, fuse, rerank

use crate::config::RetrievalConfig;
use crate::document::DocumentStore;
use crate::retrieval::{
    truncate_fused, Candidate, CollaboratorError, DenseRetriever, FusedResult, LexicalSearch,
    Query, QueryReformulator, QueryRewriter, QuerySettings, RankedResult, ReciprocalRankFusion,
    RerankScorer, Reranker, ResolvedCandidate, RetrievalError, RetrievalRequest, SparseRetriever,
    VectorSearch,
};
use crate::retry::backoff_delay;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

const BRANCH_BACKOFF: Duration = Duration::from_millis(50);
const BRANCH_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Stages a request moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Reformulating,
    Retrieving,
    Fusing,
    Reranking,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reformulating => "reformulating",
            Self::Retrieving => "retrieving",
            Self::Fusing => "fusing",
            Self::Reranking => "reranking",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened while serving a request
///
/// Every degraded stage sets its `*_failed` flag; a stage that was disabled
/// leaves both of its flags false.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalMetadata {
    pub request_id: Uuid,

    /// Text the branches actually searched with
    pub query_text: String,

    pub reformulation_applied: bool,
    pub reformulation_failed: bool,
    pub rerank_applied: bool,
    pub rerank_failed: bool,
    pub sparse_branch_failed: bool,
    pub dense_branch_failed: bool,

    /// Candidates each branch contributed to fusion
    pub sparse_candidates: usize,
    pub dense_candidates: usize,

    pub elapsed_ms: u64,
}

impl RetrievalMetadata {
    fn new(request_id: Uuid, query_text: &str) -> Self {
        Self {
            request_id,
            query_text: query_text.to_string(),
            reformulation_applied: false,
            reformulation_failed: false,
            rerank_applied: false,
            rerank_failed: false,
            sparse_branch_failed: false,
            dense_branch_failed: false,
            sparse_candidates: 0,
            dense_candidates: 0,
            elapsed_ms: 0,
        }
    }

    /// Whether any stage fell back
    pub fn is_degraded(&self) -> bool {
        self.reformulation_failed
            || self.rerank_failed
            || self.sparse_branch_failed
            || self.dense_branch_failed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub results: Vec<RankedResult>,
    pub metadata: RetrievalMetadata,
}

/// Retrieval pipeline over a lexical index, a vector index and a document store
///
/// Holds no per-request state; one instance can serve concurrent requests.
pub struct HybridRetriever {
    sparse: SparseRetriever,
    dense: DenseRetriever,
    documents: Arc<dyn DocumentStore>,
    fusion: ReciprocalRankFusion,
    reranker: Option<Reranker>,
    reformulator: Option<QueryReformulator>,
    permits: Semaphore,
    config: RetrievalConfig,
}

impl HybridRetriever {
    /// Create a pipeline; `config` supplies request defaults, RRF `k`,
    /// concurrency bound and timeouts
    pub fn new(
        sparse: Arc<dyn LexicalSearch>,
        dense: Arc<dyn VectorSearch>,
        documents: Arc<dyn DocumentStore>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        let fusion = ReciprocalRankFusion::new(config.rrf_k)
            .map_err(|e| RetrievalError::InvalidConfiguration(e.to_string()))?;

        if config.max_concurrency == 0 {
            return Err(RetrievalError::InvalidConfiguration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            sparse: SparseRetriever::new(sparse),
            dense: DenseRetriever::new(dense),
            documents,
            fusion,
            reranker: None,
            reformulator: None,
            permits: Semaphore::new(config.max_concurrency),
            config,
        })
    }

    /// Attach a rerank scorer
    pub fn with_reranker(mut self, scorer: Arc<dyn RerankScorer>) -> Self {
        self.reranker = Some(Reranker::new(scorer));
        self
    }

    /// Attach a query rewrite model
    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.reformulator = Some(QueryReformulator::new(rewriter));
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Serve one retrieval request
    ///
    /// Fails only on an invalid request (before any collaborator call) or when
    /// neither branch produced candidates. Every other failure degrades and is
    /// reported in the response metadata.
    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResponse, RetrievalError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("retrieve", request_id = %request_id);

        self.run(request_id, request).instrument(span).await
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResponse, RetrievalError> {
        let started = Instant::now();
        let deadline = started + self.config.timeouts.request;

        let settings = QuerySettings::resolve(request, &self.config).map_err(|e| {
            enter(PipelineState::Failed);
            warn!("Rejected request: {}", e);
            e
        })?;

        let mut metadata = RetrievalMetadata::new(request_id, &request.query);

        // Reformulating
        let reformulated_text = if settings.enable_query_reformulation {
            enter(PipelineState::Reformulating);
            self.reformulate(request, deadline, &mut metadata).await
        } else {
            None
        };

        let query = Query {
            raw_text: request.query.clone(),
            reformulated_text,
            settings,
        };
        metadata.query_text = query.text().to_string();

        // Retrieving
        enter(PipelineState::Retrieving);
        let (sparse, dense) = self.fan_out(&query, deadline, &mut metadata).await?;

        // Fusing
        enter(PipelineState::Fusing);
        let fused = self.fusion.fuse(&sparse, &dense, settings.top_k);
        let resolved = self.resolve_documents(fused);

        debug!(
            "Fused {} sparse + {} dense candidates into {} documents",
            sparse.len(),
            dense.len(),
            resolved.len()
        );

        // Reranking
        let results = if settings.use_rerank {
            enter(PipelineState::Reranking);
            self.rerank(&query, &resolved, deadline, &mut metadata).await
        } else {
            truncate_fused(&resolved, settings.top_n)
        };

        enter(PipelineState::Done);
        metadata.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            "Retrieved {} results in {}ms (rerank: {}, degraded: {})",
            results.len(),
            metadata.elapsed_ms,
            metadata.rerank_applied,
            metadata.is_degraded()
        );

        Ok(RetrievalResponse { results, metadata })
    }

    async fn reformulate(
        &self,
        request: &RetrievalRequest,
        deadline: Instant,
        metadata: &mut RetrievalMetadata,
    ) -> Option<String> {
        let Some(reformulator) = &self.reformulator else {
            warn!("Query reformulation requested but no rewrite model is configured");
            metadata.reformulation_failed = true;
            return None;
        };

        let Some(limit) = stage_limit(self.config.timeouts.reformulation, deadline) else {
            warn!("Request budget exhausted before reformulation, using raw query");
            metadata.reformulation_failed = true;
            return None;
        };

        match self
            .bounded(limit, reformulator.reformulate(&request.query, &request.history))
            .await
        {
            Ok(text) => {
                metadata.reformulation_applied = true;
                Some(text)
            }
            Err(e) => {
                warn!("Query reformulation failed, using raw query: {}", e);
                metadata.reformulation_failed = true;
                None
            }
        }
    }

    /// Query both branches concurrently; a failed branch counts as empty
    async fn fan_out(
        &self,
        query: &Query,
        deadline: Instant,
        metadata: &mut RetrievalMetadata,
    ) -> Result<(Vec<Candidate>, Vec<Candidate>), RetrievalError> {
        let count = query.settings.prefetch_count();
        let limit = stage_limit(self.config.timeouts.branch, deadline).unwrap_or(Duration::ZERO);

        let text = query.text();
        let (sparse_branch, dense_branch) = (&self.sparse, &self.dense);

        let (sparse, dense) = tokio::join!(
            self.bounded_retrying(limit, move || sparse_branch.retrieve(text, count)),
            self.bounded_retrying(limit, move || dense_branch.retrieve(text, count)),
        );

        let (sparse, sparse_reason) = settle("sparse", sparse, &mut metadata.sparse_branch_failed);
        let (dense, dense_reason) = settle("dense", dense, &mut metadata.dense_branch_failed);

        metadata.sparse_candidates = sparse.len();
        metadata.dense_candidates = dense.len();

        if sparse.is_empty() && dense.is_empty() {
            enter(PipelineState::Failed);
            return Err(RetrievalError::TotalRetrievalFailure {
                sparse: sparse_reason,
                dense: dense_reason,
            });
        }

        Ok((sparse, dense))
    }

    async fn rerank(
        &self,
        query: &Query,
        resolved: &[ResolvedCandidate],
        deadline: Instant,
        metadata: &mut RetrievalMetadata,
    ) -> Vec<RankedResult> {
        let top_n = query.settings.top_n;

        let Some(reranker) = &self.reranker else {
            warn!("Reranking requested but no scorer is configured, keeping fusion order");
            metadata.rerank_failed = true;
            return truncate_fused(resolved, top_n);
        };

        let Some(limit) = stage_limit(self.config.timeouts.rerank, deadline) else {
            warn!("Request budget exhausted before reranking, keeping fusion order");
            metadata.rerank_failed = true;
            return truncate_fused(resolved, top_n);
        };

        // Cross-encoder judges the user's own wording
        match self
            .bounded(limit, reranker.rerank(&query.raw_text, resolved, top_n))
            .await
        {
            Ok(results) => {
                metadata.rerank_applied = true;
                results
            }
            Err(e) => {
                warn!("Reranking failed, keeping fusion order: {}", e);
                metadata.rerank_failed = true;
                truncate_fused(resolved, top_n)
            }
        }
    }

    fn resolve_documents(&self, fused: Vec<FusedResult>) -> Vec<ResolvedCandidate> {
        fused
            .into_iter()
            .filter_map(|fused| match self.documents.get(&fused.document_id) {
                Some(document) => Some(ResolvedCandidate { fused, document }),
                None => {
                    warn!("Document {} not found in store, dropping", fused.document_id);
                    None
                }
            })
            .collect()
    }

    /// Run a collaborator call under the concurrency bound and a deadline
    ///
    /// Waiting for a permit counts against `limit`.
    async fn bounded<T, F>(&self, limit: Duration, call: F) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        tokio::time::timeout(limit, self.permitted(call))
            .await
            .unwrap_or(Err(CollaboratorError::Timeout(limit)))
    }

    /// Like `bounded`, but transient errors are retried with backoff until
    /// `branch_attempts` or `limit` runs out
    ///
    /// Each attempt takes its own permit; backoff sleeps hold none.
    async fn bounded_retrying<T, F, Fut>(
        &self,
        limit: Duration,
        call: F,
    ) -> Result<T, CollaboratorError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let attempts = self.config.branch_attempts.max(1);

        let retrying = async {
            let mut attempt = 1;
            loop {
                match self.permitted(call()).await {
                    Err(e) if e.is_retryable() && attempt < attempts => {
                        let delay = backoff_delay(BRANCH_BACKOFF, BRANCH_MAX_BACKOFF, attempt);
                        debug!("Retrying search in {:?} after: {}", delay, e);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    outcome => return outcome,
                }
            }
        };

        tokio::time::timeout(limit, retrying)
            .await
            .unwrap_or(Err(CollaboratorError::Timeout(limit)))
    }

    async fn permitted<T, F>(&self, call: F) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
        call.await
    }
}

fn enter(state: PipelineState) {
    debug!("Pipeline state: {}", state);
}

/// Stage timeout clipped to what is left of the request budget
fn stage_limit(stage: Duration, deadline: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        None
    } else {
        Some(stage.min(remaining))
    }
}

fn settle(
    branch: &str,
    outcome: Result<Vec<Candidate>, CollaboratorError>,
    failed: &mut bool,
) -> (Vec<Candidate>, String) {
    match outcome {
        Ok(candidates) if candidates.is_empty() => (candidates, "no candidates".to_string()),
        Ok(candidates) => (candidates, String::new()),
        Err(e) => {
            warn!("{} branch failed, treating as empty: {}", branch, e);
            *failed = true;
            (Vec::new(), e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, DocumentId, InMemoryDocumentStore};
    use crate::retrieval::{ScoreSource, ScoredId};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Vec<ScoredId>);

    #[async_trait]
    impl LexicalSearch for Fixed {
        async fn search(
            &self,
            _text: &str,
            count: usize,
        ) -> Result<Vec<ScoredId>, CollaboratorError> {
            Ok(self.0.iter().take(count).cloned().collect())
        }
    }

    #[async_trait]
    impl VectorSearch for Fixed {
        async fn search(
            &self,
            _text: &str,
            count: usize,
        ) -> Result<Vec<ScoredId>, CollaboratorError> {
            Ok(self.0.iter().take(count).cloned().collect())
        }
    }

    struct Down;

    #[async_trait]
    impl LexicalSearch for Down {
        async fn search(
            &self,
            _text: &str,
            _count: usize,
        ) -> Result<Vec<ScoredId>, CollaboratorError> {
            Err(CollaboratorError::Unavailable("index offline".to_string()))
        }
    }

    #[async_trait]
    impl VectorSearch for Down {
        async fn search(
            &self,
            _text: &str,
            _count: usize,
        ) -> Result<Vec<ScoredId>, CollaboratorError> {
            Err(CollaboratorError::Unavailable("index offline".to_string()))
        }
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl LexicalSearch for Counting {
        async fn search(
            &self,
            _text: &str,
            _count: usize,
        ) -> Result<Vec<ScoredId>, CollaboratorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![(DocumentId::from("A"), 1.0)])
        }
    }

    /// Fails the first `failures` calls with `error`, then answers with one hit
    struct Flaky {
        failures: usize,
        error: CollaboratorError,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: usize, error: CollaboratorError) -> Arc<Self> {
            Arc::new(Self {
                failures,
                error,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LexicalSearch for Flaky {
        async fn search(
            &self,
            _text: &str,
            _count: usize,
        ) -> Result<Vec<ScoredId>, CollaboratorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(vec![(DocumentId::from("A"), 1.0)])
        }
    }

    fn hits(items: &[(&str, f32)]) -> Vec<ScoredId> {
        items
            .iter()
            .map(|(id, score)| (DocumentId::from(*id), *score))
            .collect()
    }

    fn store(ids: &[&str]) -> Arc<InMemoryDocumentStore> {
        Arc::new(
            ids.iter()
                .map(|id| Document {
                    id: DocumentId::from(*id),
                    channel_id: "markets".to_string(),
                    text: format!("news about {}", id),
                    timestamp: Utc::now(),
                    url: None,
                })
                .collect(),
        )
    }

    fn retriever(sparse: Arc<dyn LexicalSearch>, dense: Arc<dyn VectorSearch>) -> HybridRetriever {
        configured(sparse, dense, RetrievalConfig::default())
    }

    fn configured(
        sparse: Arc<dyn LexicalSearch>,
        dense: Arc<dyn VectorSearch>,
        config: RetrievalConfig,
    ) -> HybridRetriever {
        HybridRetriever::new(sparse, dense, store(&["A", "B", "C", "D"]), config).unwrap()
    }

    #[tokio::test]
    async fn test_fusion_order_without_rerank() {
        let pipeline = retriever(
            Arc::new(Fixed(hits(&[("A", 10.0), ("B", 8.0), ("C", 5.0)]))),
            Arc::new(Fixed(hits(&[("B", 0.9), ("C", 0.8), ("D", 0.7)]))),
        );

        let request = RetrievalRequest::new("rates").with_rerank(false);
        let response = pipeline.retrieve(&request).await.unwrap();

        let order: Vec<&str> = response
            .results
            .iter()
            .map(|r| r.document_id.as_str())
            .collect();
        assert_eq!(order, vec!["B", "C", "A", "D"]);
        assert!(response.results.iter().all(|r| r.score_source == ScoreSource::Fusion));
        assert!(!response.metadata.rerank_applied);
        assert!(!response.metadata.rerank_failed);
        assert_eq!(response.metadata.sparse_candidates, 3);
        assert_eq!(response.metadata.dense_candidates, 3);
        assert_eq!(response.metadata.query_text, "rates");
    }

    #[tokio::test]
    async fn test_invalid_request_makes_no_calls() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let pipeline = retriever(counter.clone(), Arc::new(Fixed(Vec::new())));

        let request = RetrievalRequest::new("q").with_top_k(3).with_top_n(4);
        let err = pipeline.retrieve(&request).await.unwrap_err();

        assert!(err.is_configuration_error());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_branch_down_degrades() {
        let pipeline = retriever(
            Arc::new(Down),
            Arc::new(Fixed(hits(&[("B", 0.9), ("C", 0.8)]))),
        );

        let response = pipeline
            .retrieve(&RetrievalRequest::new("q").with_rerank(false))
            .await
            .unwrap();

        assert!(response.metadata.sparse_branch_failed);
        assert!(!response.metadata.dense_branch_failed);
        assert!(response.metadata.is_degraded());
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].provenance.sparse_rank, None);
    }

    #[tokio::test]
    async fn test_both_branches_down_is_total_failure() {
        let pipeline = retriever(Arc::new(Down), Arc::new(Down));

        let err = pipeline
            .retrieve(&RetrievalRequest::new("q"))
            .await
            .unwrap_err();

        match err {
            RetrievalError::TotalRetrievalFailure { sparse, dense } => {
                assert!(sparse.contains("index offline"));
                assert!(dense.contains("index offline"));
            }
            other => panic!("expected total failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transient_branch_error_is_retried() {
        let sparse = Flaky::new(1, CollaboratorError::Unavailable("reconnecting".to_string()));
        let pipeline = retriever(sparse.clone(), Arc::new(Fixed(hits(&[("B", 0.9)]))));

        let response = pipeline
            .retrieve(&RetrievalRequest::new("q").with_rerank(false))
            .await
            .unwrap();

        assert_eq!(sparse.calls(), 2);
        assert!(!response.metadata.sparse_branch_failed);
        assert_eq!(response.metadata.sparse_candidates, 1);
    }

    #[tokio::test]
    async fn test_permanent_branch_error_is_not_retried() {
        let sparse = Flaky::new(1, CollaboratorError::Failed("bad query syntax".to_string()));
        let pipeline = retriever(sparse.clone(), Arc::new(Fixed(hits(&[("B", 0.9)]))));

        let response = pipeline
            .retrieve(&RetrievalRequest::new("q").with_rerank(false))
            .await
            .unwrap();

        assert_eq!(sparse.calls(), 1);
        assert!(response.metadata.sparse_branch_failed);
    }

    #[tokio::test]
    async fn test_branch_retries_stop_at_attempt_limit() {
        let config = RetrievalConfig {
            branch_attempts: 3,
            ..RetrievalConfig::default()
        };
        let sparse = Flaky::new(usize::MAX, CollaboratorError::Unavailable("down".to_string()));
        let pipeline = configured(sparse.clone(), Arc::new(Fixed(hits(&[("B", 0.9)]))), config);

        let response = pipeline
            .retrieve(&RetrievalRequest::new("q").with_rerank(false))
            .await
            .unwrap();

        assert_eq!(sparse.calls(), 3);
        assert!(response.metadata.sparse_branch_failed);
    }

    #[tokio::test]
    async fn test_branch_retries_stop_at_branch_timeout() {
        let mut config = RetrievalConfig {
            branch_attempts: 50,
            ..RetrievalConfig::default()
        };
        config.timeouts.branch = Duration::from_millis(120);
        let sparse = Flaky::new(usize::MAX, CollaboratorError::Unavailable("down".to_string()));
        let pipeline = configured(sparse.clone(), Arc::new(Fixed(hits(&[("B", 0.9)]))), config);

        let started = std::time::Instant::now();
        let response = pipeline
            .retrieve(&RetrievalRequest::new("q").with_rerank(false))
            .await
            .unwrap();

        // Backoff starts at 50ms and doubles, so only a few attempts fit
        assert!(sparse.calls() < 5);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(response.metadata.sparse_branch_failed);
        assert_eq!(response.results.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_scorer_is_flagged() {
        let pipeline = retriever(
            Arc::new(Fixed(hits(&[("A", 1.0)]))),
            Arc::new(Fixed(Vec::new())),
        );

        let response = pipeline.retrieve(&RetrievalRequest::new("q")).await.unwrap();

        assert!(response.metadata.rerank_failed);
        assert!(!response.metadata.rerank_applied);
        assert_eq!(response.results[0].score_source, ScoreSource::Fusion);
    }

    #[tokio::test]
    async fn test_missing_rewriter_is_flagged() {
        let pipeline = retriever(
            Arc::new(Fixed(hits(&[("A", 1.0)]))),
            Arc::new(Fixed(Vec::new())),
        );

        let request = RetrievalRequest::new("q")
            .with_rerank(false)
            .with_reformulation(true);
        let response = pipeline.retrieve(&request).await.unwrap();

        assert!(response.metadata.reformulation_failed);
        assert!(!response.metadata.reformulation_applied);
        assert_eq!(response.metadata.query_text, "q");
    }

    #[tokio::test]
    async fn test_unknown_documents_are_dropped() {
        let pipeline = retriever(
            Arc::new(Fixed(hits(&[("A", 2.0), ("ghost", 1.0)]))),
            Arc::new(Fixed(Vec::new())),
        );

        let response = pipeline
            .retrieve(&RetrievalRequest::new("q").with_rerank(false))
            .await
            .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].document_id.as_str(), "A");
    }

    #[test]
    fn test_invalid_pipeline_config() {
        let config = RetrievalConfig {
            rrf_k: 0.0,
            ..RetrievalConfig::default()
        };

        let result = HybridRetriever::new(Arc::new(Down), Arc::new(Down), store(&[]), config);

        assert!(matches!(result, Err(RetrievalError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_stage_limit_clips_to_budget() {
        let deadline = Instant::now() + Duration::from_secs(2);
        let limit = stage_limit(Duration::from_secs(10), deadline).unwrap();
        assert!(limit <= Duration::from_secs(2));

        let past = Instant::now() - Duration::from_millis(1);
        assert!(stage_limit(Duration::from_secs(1), past).is_none());
    }
}
