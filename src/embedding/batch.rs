/// Batch indexing: embed documents and populate both indices
use super::{EmbeddingError, EmbeddingProvider, KeywordIndex, VectorIndex};
use crate::document::{Document, DocumentId};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of an indexing run
#[derive(Debug)]
pub struct BatchResult {
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

type EmbeddedChunk = Vec<(DocumentId, String, Vec<f32>)>;

/// Embeds documents in chunks and writes them to the vector and keyword indices
///
/// Up to `max_concurrent` chunks are embedded at once on the blocking pool.
/// A chunk that fails to embed is skipped as a whole and counted as failed.
pub struct BatchProcessor {
    provider: Arc<dyn EmbeddingProvider>,
    vector_index: VectorIndex,
    keyword_index: Arc<Mutex<KeywordIndex>>,
    batch_size: usize,
    max_concurrent: usize,
}

impl BatchProcessor {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        vector_index: VectorIndex,
        keyword_index: Arc<Mutex<KeywordIndex>>,
        batch_size: usize,
        max_concurrent: usize,
    ) -> Self {
        Self {
            provider,
            vector_index,
            keyword_index,
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Index `documents`, committing the keyword index at the end
    pub async fn process(&self, documents: Vec<Arc<Document>>) -> Result<BatchResult> {
        let start = std::time::Instant::now();
        let total = documents.len();

        info!("Indexing {} documents", total);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (chunk_idx, chunk) in documents.chunks(self.batch_size).enumerate() {
            let permit = semaphore.clone().acquire_owned().await?;
            let provider = self.provider.clone();
            let chunk: Vec<Arc<Document>> = chunk.to_vec();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let len = chunk.len();
                (chunk_idx, len, embed_chunk(provider.as_ref(), &chunk))
            });
        }

        let mut embedded = Vec::new();
        let mut failed = 0;

        while let Some(joined) = tasks.join_next().await {
            let (chunk_idx, len, outcome) = joined?;
            match outcome {
                Ok(items) => embedded.push((chunk_idx, items)),
                Err(e) => {
                    warn!("Failed to embed chunk {}: {}", chunk_idx, e);
                    failed += len;
                }
            }
        }

        // Insert in corpus order so index layout does not depend on scheduling
        embedded.sort_by_key(|(chunk_idx, _)| *chunk_idx);

        let mut processed = 0;
        let mut keyword_index = self.keyword_index.lock().await;

        for (chunk_idx, items) in embedded {
            for (id, text, vector) in items {
                if let Err(e) = self.vector_index.insert(&id, &vector) {
                    warn!("Skipping document {}: {}", id, e);
                    failed += 1;
                    continue;
                }
                keyword_index.insert(&id, &text)?;
                processed += 1;
            }
            debug!("Indexed chunk {}", chunk_idx);
        }

        keyword_index.commit()?;

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Indexing complete: {} processed, {} failed, {}ms",
            processed, failed, duration_ms
        );

        Ok(BatchResult {
            processed,
            failed,
            duration_ms,
        })
    }
}

fn embed_chunk(
    provider: &dyn EmbeddingProvider,
    chunk: &[Arc<Document>],
) -> Result<EmbeddedChunk, EmbeddingError> {
    let texts: Vec<String> = chunk.iter().map(|d| d.text.clone()).collect();
    let embeddings = provider.embed_batch(&texts)?;

    if embeddings.len() != chunk.len() {
        return Err(EmbeddingError::GenerationError(format!(
            "Embedding count mismatch: expected {}, got {}",
            chunk.len(),
            embeddings.len()
        )));
    }

    Ok(chunk
        .iter()
        .zip(texts)
        .zip(embeddings)
        .map(|((document, text), vector)| (document.id.clone(), text, vector))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HnswParams;
    use chrono::Utc;

    const DIM: usize = 8;

    /// Bag-of-bytes embedding; rejects texts containing "poison"
    struct ByteEmbedder;

    impl EmbeddingProvider for ByteEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.contains("poison") {
                return Err(EmbeddingError::InvalidInput(text.to_string()));
            }
            let mut v = vec![0.0; DIM];
            v[0] = 1.0;
            for b in text.bytes() {
                v[(b as usize) % DIM] += 1.0;
            }
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn model_name(&self) -> &str {
            "bytes"
        }
    }

    fn documents(texts: &[&str]) -> Vec<Arc<Document>> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                Arc::new(Document {
                    id: DocumentId::new(format!("d{}", i)),
                    channel_id: "wire".to_string(),
                    text: text.to_string(),
                    timestamp: Utc::now(),
                    url: None,
                })
            })
            .collect()
    }

    fn processor(batch_size: usize) -> (BatchProcessor, VectorIndex, Arc<Mutex<KeywordIndex>>) {
        let vector_index = VectorIndex::new(HnswParams {
            dimension: DIM,
            max_elements: 1_000,
            ..HnswParams::default()
        });
        let keyword_index = Arc::new(Mutex::new(KeywordIndex::in_ram().unwrap()));

        let processor = BatchProcessor::new(
            Arc::new(ByteEmbedder),
            vector_index.clone(),
            keyword_index.clone(),
            batch_size,
            2,
        );

        (processor, vector_index, keyword_index)
    }

    #[tokio::test]
    async fn test_indexes_every_document() {
        let (processor, vectors, keywords) = processor(2);
        let docs = documents(&[
            "gas exports",
            "coal imports",
            "power prices",
            "grid upgrade",
            "tariffs",
        ]);

        let result = processor.process(docs).await.unwrap();

        assert_eq!(result.processed, 5);
        assert_eq!(result.failed, 0);
        assert_eq!(vectors.len(), 5);
        assert_eq!(keywords.lock().await.len(), 5);
        assert!(vectors.contains(&DocumentId::from("d4")));
    }

    #[tokio::test]
    async fn test_failed_chunk_is_skipped() {
        let (processor, vectors, keywords) = processor(2);
        let docs = documents(&["gas exports", "poison pill", "power prices"]);

        let result = processor.process(docs).await.unwrap();

        assert_eq!(result.processed, 1);
        assert_eq!(result.failed, 2);
        assert_eq!(vectors.len(), 1);

        let keywords = keywords.lock().await;
        assert_eq!(keywords.search("power", 10).unwrap().len(), 1);
        assert!(keywords.search("gas", 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (processor, vectors, _keywords) = processor(4);

        let result = processor.process(Vec::new()).await.unwrap();

        assert_eq!(result.processed, 0);
        assert!(vectors.is_empty());
    }
}
