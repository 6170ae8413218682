//! newsfuse - Hybrid retrieval for news corpora
//!
//! Retrieves source documents for a natural-language query by running a BM25
//! keyword search and an embedding similarity search concurrently, merging the
//! two rankings with Reciprocal Rank Fusion and optionally reranking the
//! merged list with a cross-encoder. Queries can be rewritten by a language
//! model first. Collaborator failures degrade the response instead of failing
//! it, and every degradation is reported in the response metadata.

pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
mod retry;

pub use error::{NewsfuseError, Result};
