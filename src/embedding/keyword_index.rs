/// Tantivy keyword index for BM25 full-text search
use crate::document::DocumentId;
use crate::retrieval::{CollaboratorError, LexicalSearch, ScoredId};
use async_trait::async_trait;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};
use thiserror::Error;

const WRITER_BUDGET_BYTES: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Tantivy keyword index wrapper
///
/// Documents are keyed by their string id; re-inserting an id replaces the
/// earlier document after the next commit.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    id_field: Field,
    text_field: Field,
}

impl KeywordIndex {
    /// Open the index in `index_dir`, creating it if needed
    pub fn open_or_create(index_dir: &Path) -> Result<Self, KeywordIndexError> {
        if index_dir.join("meta.json").exists() {
            let index = Index::open_in_dir(index_dir)
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;
            Self::from_index(index)
        } else {
            std::fs::create_dir_all(index_dir)?;
            let index = Index::create_in_dir(index_dir, Self::schema())
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;
            Self::from_index(index)
        }
    }

    /// Create a non-persistent index
    pub fn in_ram() -> Result<Self, KeywordIndexError> {
        Self::from_index(Index::create_in_ram(Self::schema()))
    }

    fn schema() -> Schema {
        let mut schema_builder = Schema::builder();
        schema_builder.add_text_field("id", STRING | STORED);
        schema_builder.add_text_field("text", TEXT);
        schema_builder.build()
    }

    fn from_index(index: Index) -> Result<Self, KeywordIndexError> {
        let schema = index.schema();

        let id_field = schema.get_field("id").map_err(|_| {
            KeywordIndexError::InitializationError("Missing 'id' field in schema".to_string())
        })?;

        let text_field = schema.get_field("text").map_err(|_| {
            KeywordIndexError::InitializationError("Missing 'text' field in schema".to_string())
        })?;

        let writer = index
            .writer(WRITER_BUDGET_BYTES)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer,
            id_field,
            text_field,
        })
    }

    /// Stage a document; visible to searches after `commit`
    pub fn insert(&mut self, id: &DocumentId, text: &str) -> Result<(), KeywordIndexError> {
        self.writer
            .delete_term(Term::from_field_text(self.id_field, id.as_str()));

        self.writer
            .add_document(doc!(
                self.id_field => id.as_str(),
                self.text_field => text,
            ))
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        Ok(())
    }

    pub fn insert_batch(
        &mut self,
        items: &[(DocumentId, String)],
    ) -> Result<(), KeywordIndexError> {
        for (id, text) in items {
            self.insert(id, text)?;
        }
        Ok(())
    }

    /// Commit pending changes and refresh the reader
    pub fn commit(&mut self) -> Result<(), KeywordIndexError> {
        self.writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// Read-only handle for the sparse branch
    pub fn searcher(&self) -> KeywordSearcher {
        KeywordSearcher {
            index: self.index.clone(),
            reader: self.reader.clone(),
            id_field: self.id_field,
            text_field: self.text_field,
        }
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredId>, KeywordIndexError> {
        self.searcher().search_blocking(query, limit)
    }

    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cloneable BM25 search handle over a committed `KeywordIndex`
#[derive(Clone)]
pub struct KeywordSearcher {
    index: Index,
    reader: IndexReader,
    id_field: Field,
    text_field: Field,
}

impl KeywordSearcher {
    /// BM25 search, best first
    ///
    /// Free text is parsed leniently: syntax the query language rejects
    /// (stray colons, unbalanced quotes) is ignored rather than failing.
    pub fn search_blocking(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredId>, KeywordIndexError> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        // The collector allocates for `limit` up front
        let limit = limit.min(searcher.num_docs() as usize);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (query, errors) = query_parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!("Ignored {} query syntax errors", errors.len());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let id = retrieved
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    KeywordIndexError::SearchError("Missing or invalid ID field".to_string())
                })?;

            hits.push((DocumentId::from(id), score));
        }

        Ok(hits)
    }
}

#[async_trait]
impl LexicalSearch for KeywordSearcher {
    async fn search(&self, text: &str, count: usize) -> Result<Vec<ScoredId>, CollaboratorError> {
        let searcher = self.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || searcher.search_blocking(&text, count))
            .await
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?
            .map_err(|e| CollaboratorError::Failed(e.to_string()))
    }
}
