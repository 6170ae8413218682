//! Source documents and read-only document lookup
//!
//! Documents are owned by the indexing side. The retrieval pipeline only
//! resolves `Arc<Document>` references through a [`DocumentStore`].

use crate::error::{NewsfuseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

/// Unique document identifier. Ordering is used for deterministic tie-breaks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A news item from a source channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,

    /// Channel the item was published in
    pub channel_id: String,

    pub text: String,

    /// Publication time
    pub timestamp: DateTime<Utc>,

    /// Link to the original post
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Document {
    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &self.text[..idx]),
            None => self.text.clone(),
        }
    }
}

/// Read-only document lookup used to resolve ranked ids
pub trait DocumentStore: Send + Sync {
    /// Resolve a document by id
    fn get(&self, id: &DocumentId) -> Option<Arc<Document>>;

    /// Number of documents available
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory document store that remembers insertion order
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    documents: HashMap<DocumentId, Arc<Document>>,
    order: Vec<DocumentId>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document; a later document with the same id replaces the
    /// earlier one but keeps its position
    pub fn insert(&mut self, document: Document) {
        let id = document.id.clone();
        if self.documents.insert(id.clone(), Arc::new(document)).is_none() {
            self.order.push(id);
        }
    }

    /// Load documents from a JSON Lines file (one document per line)
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| NewsfuseError::Io {
            source: e,
            context: format!("Failed to open corpus: {:?}", path),
        })?;

        let mut store = Self::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| NewsfuseError::Io {
                source: e,
                context: format!("Failed to read corpus: {:?}", path),
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let document: Document =
                serde_json::from_str(&line).map_err(|e| NewsfuseError::Corpus {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    message: e.to_string(),
                })?;

            if document.text.trim().is_empty() {
                return Err(NewsfuseError::Corpus {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    message: format!("Document {} has empty text", document.id),
                });
            }

            store.insert(document);
        }

        tracing::info!("Loaded {} documents from {:?}", store.len(), path);

        Ok(store)
    }

    /// Iterate over all documents in the order they were first inserted
    pub fn documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.order.iter().filter_map(|id| self.documents.get(id))
    }
}

impl FromIterator<Document> for InMemoryDocumentStore {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        let mut store = Self::new();
        for document in iter {
            store.insert(document);
        }
        store
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, id: &DocumentId) -> Option<Arc<Document>> {
        self.documents.get(id).cloned()
    }

    fn len(&self) -> usize {
        self.documents.len()
    }
}
