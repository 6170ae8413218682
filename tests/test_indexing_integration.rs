/// Integration tests: corpus indexing feeding the hybrid retriever
///
/// Uses real tantivy and HNSW indices with a small topic embedder so the
/// full path runs without downloading a model.
use chrono::{TimeZone, Utc};
use newsfuse::config::{Config, RetrievalConfig};
use newsfuse::document::{Document, DocumentId, DocumentStore, InMemoryDocumentStore};
use newsfuse::embedding::{
    BatchProcessor, EmbeddingError, EmbeddingProvider, EmbeddingVectorSearch, HnswParams,
    KeywordIndex, VectorIndex,
};
use newsfuse::pipeline::{self, BuildOptions};
use newsfuse::retrieval::{HybridRetriever, RetrievalRequest};
use newsfuse::NewsfuseError;
use std::io::Write;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::Mutex;

const DIM: usize = 4;

/// One axis per topic plus a constant bias; rejects texts containing "poison"
struct TopicEmbedder;

impl EmbeddingProvider for TopicEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_lowercase();
        if text.contains("poison") {
            return Err(EmbeddingError::InvalidInput("poisoned text".to_string()));
        }

        let axis = |words: &[&str]| {
            if words.iter().any(|w| text.contains(w)) {
                1.0
            } else {
                0.0
            }
        };

        Ok(vec![
            axis(&["oil", "crude", "brent"]),
            axis(&["bank", "rate"]),
            axis(&["cloud", "tech"]),
            0.1,
        ])
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "topics"
    }
}

fn news() -> Vec<Document> {
    let items = [
        ("oil-1", "energy", "Brent crude rises as OPEC extends output cuts"),
        ("oil-2", "energy", "Russian oil exports fall for a third month"),
        ("bank-1", "markets", "Central bank holds the key rate at 16 percent"),
        ("bank-2", "markets", "Sberbank shareholders approve record dividends"),
        ("tech-1", "tech", "Yandex cloud revenue doubles year over year"),
    ];

    items
        .iter()
        .enumerate()
        .map(|(i, (id, channel, text))| Document {
            id: DocumentId::from(*id),
            channel_id: channel.to_string(),
            text: text.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 2, 1 + i as u32, 8, 0, 0).unwrap(),
            url: None,
        })
        .collect()
}

async fn index(
    documents: &[Document],
    batch_size: usize,
) -> (HybridRetriever, newsfuse::embedding::BatchResult) {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(TopicEmbedder);
    let vector_index = VectorIndex::new(HnswParams {
        dimension: DIM,
        max_elements: 100,
        ..HnswParams::default()
    });
    let keyword_index = Arc::new(Mutex::new(KeywordIndex::in_ram().unwrap()));

    let processor = BatchProcessor::new(
        provider.clone(),
        vector_index.clone(),
        keyword_index.clone(),
        batch_size,
        2,
    );
    let result = processor
        .process(documents.iter().cloned().map(Arc::new).collect())
        .await
        .unwrap();

    let sparse = Arc::new(keyword_index.lock().await.searcher());
    let dense = Arc::new(EmbeddingVectorSearch::new(provider, vector_index, 64));
    let store: InMemoryDocumentStore = documents.iter().cloned().collect();

    let retriever =
        HybridRetriever::new(sparse, dense, Arc::new(store), RetrievalConfig::default()).unwrap();

    (retriever, result)
}

fn ids(response: &newsfuse::retrieval::RetrievalResponse) -> Vec<String> {
    response
        .results
        .iter()
        .map(|r| r.document_id.to_string())
        .collect()
}

#[tokio::test]
async fn test_indexed_corpus_answers_topic_query() {
    let (retriever, indexed) = index(&news(), 2).await;
    assert_eq!(indexed.processed, 5);
    assert_eq!(indexed.failed, 0);

    let request = RetrievalRequest::new("oil exports")
        .with_top_k(5)
        .with_top_n(2)
        .with_rerank(false);
    let response = retriever.retrieve(&request).await.unwrap();

    let mut top = ids(&response);
    top.sort();
    assert_eq!(top, vec!["oil-1", "oil-2"]);
    assert!(!response.metadata.is_degraded());
    assert!(response.metadata.sparse_candidates >= 1);
    assert!(response.metadata.dense_candidates >= 2);
}

#[tokio::test]
async fn test_keyword_only_match_ranks_first() {
    let (retriever, _) = index(&news(), 5).await;

    // "OPEC" has no topic axis, so the dense branch cannot tell documents apart
    let request = RetrievalRequest::new("OPEC").with_rerank(false);
    let response = retriever.retrieve(&request).await.unwrap();

    let first = &response.results[0];
    assert_eq!(first.document_id.as_str(), "oil-1");
    assert_eq!(first.provenance.sparse_rank, Some(1));
    assert!(first.provenance.dense_rank.is_some());
    assert_eq!(first.document.channel_id, "energy");
}

#[tokio::test]
async fn test_failed_chunk_is_skipped_not_fatal() {
    let mut documents = news();
    documents.push(Document {
        id: DocumentId::from("bad-1"),
        channel_id: "spam".to_string(),
        text: "poison pill bank offer".to_string(),
        timestamp: Utc::now(),
        url: None,
    });

    let (retriever, indexed) = index(&documents, 1).await;
    assert_eq!(indexed.processed, 5);
    assert_eq!(indexed.failed, 1);

    let request = RetrievalRequest::new("bank offer").with_rerank(false);
    let response = retriever.retrieve(&request).await.unwrap();

    assert!(!ids(&response).contains(&"bad-1".to_string()));
    assert!(ids(&response).contains(&"bank-1".to_string()));
}

#[tokio::test]
async fn test_build_rejects_empty_corpus() {
    let corpus = NamedTempFile::new().unwrap();

    let err = pipeline::build(
        &Config::default(),
        corpus.path(),
        BuildOptions::from_config(&Config::default()),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(err, NewsfuseError::Corpus { .. }));
}

#[tokio::test]
async fn test_corpus_roundtrips_through_jsonl() {
    let mut corpus = NamedTempFile::new().unwrap();
    for document in news() {
        writeln!(corpus, "{}", serde_json::to_string(&document).unwrap()).unwrap();
    }
    writeln!(corpus).unwrap();

    let store = InMemoryDocumentStore::from_jsonl(corpus.path()).unwrap();

    assert_eq!(store.len(), 5);
    let doc = store.get(&DocumentId::from("bank-2")).unwrap();
    assert_eq!(doc.channel_id, "markets");
    assert_eq!(doc.timestamp, Utc.with_ymd_and_hms(2024, 2, 4, 8, 0, 0).unwrap());
}

#[tokio::test]
#[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
async fn test_full_pipeline_with_local_models() {
    println!("\n=== Hybrid retrieval over a local corpus ===\n");

    let temp = TempDir::new().unwrap();
    let corpus_path = temp.path().join("news.jsonl");
    let mut corpus = std::fs::File::create(&corpus_path).unwrap();
    for document in news() {
        writeln!(corpus, "{}", serde_json::to_string(&document).unwrap()).unwrap();
    }

    let mut config = Config::default();
    config.indexing.keyword_dir = Some(temp.path().join("keywords"));

    let retriever = pipeline::build(
        &config,
        &corpus_path,
        BuildOptions {
            reranker: true,
            rewriter: false,
        },
    )
    .await
    .expect("Failed to build pipeline");

    println!("✓ Pipeline built");

    let request = RetrievalRequest::new("What did the central bank decide about rates?")
        .with_top_k(5)
        .with_top_n(3);
    let response = retriever.retrieve(&request).await.unwrap();

    for result in &response.results {
        println!(
            "  {}. {} ({:.4}, {:?})",
            result.final_rank, result.document_id, result.final_score, result.score_source
        );
    }

    assert_eq!(response.results.len(), 3);
    assert!(response.metadata.rerank_applied);
    assert_eq!(response.results[0].document_id.as_str(), "bank-1");

    println!("\n✓ Reranked results look sane");
}
