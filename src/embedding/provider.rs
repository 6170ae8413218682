//! Text embedding backends
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Text embedding backend
///
/// Calls are blocking; async callers go through `spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts; output is aligned with input
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// A fastembed model the provider knows how to load
struct ModelSpec {
    aliases: &'static [&'static str],
    model: EmbeddingModel,
    dimension: usize,
    download_mb: usize,
}

const SUPPORTED_MODELS: &[ModelSpec] = &[
    ModelSpec {
        aliases: &["all-MiniLM-L6-v2", "all-minilm-l6-v2"],
        model: EmbeddingModel::AllMiniLML6V2,
        dimension: 384,
        download_mb: 90,
    },
    ModelSpec {
        aliases: &["bge-small-en-v1.5"],
        model: EmbeddingModel::BGESmallENV15,
        dimension: 384,
        download_mb: 130,
    },
    ModelSpec {
        aliases: &["bge-base-en-v1.5"],
        model: EmbeddingModel::BGEBaseENV15,
        dimension: 768,
        download_mb: 440,
    },
    ModelSpec {
        aliases: &["multilingual-e5-small", "intfloat/multilingual-e5-small"],
        model: EmbeddingModel::MultilingualE5Small,
        dimension: 384,
        download_mb: 470,
    },
];

fn resolve_model(name: &str) -> Option<&'static ModelSpec> {
    SUPPORTED_MODELS
        .iter()
        .find(|spec| spec.aliases.contains(&name))
}

/// Local embedding via FastEmbed (ONNX)
///
/// Models are downloaded on first use into the fastembed cache.
pub struct FastEmbedProvider {
    engine: Arc<TextEmbedding>,
    name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let spec = resolve_model(model_name).ok_or_else(|| {
            let known: Vec<&str> = SUPPORTED_MODELS.iter().map(|s| s.aliases[0]).collect();
            EmbeddingError::InitializationError(format!(
                "Unknown embedding model '{}' (known: {})",
                model_name,
                known.join(", ")
            ))
        })?;

        tracing::info!(
            "Loading embedding model {} ({} dims, ~{}MB on first download)",
            model_name,
            spec.dimension,
            spec.download_mb
        );

        let engine = TextEmbedding::try_new(
            InitOptions::new(spec.model.clone()).with_show_download_progress(true),
        )
        .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            engine: Arc::new(engine),
            name: model_name.to_string(),
            dimension: spec.dimension,
        })
    }

    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new(SUPPORTED_MODELS[0].aliases[0])
    }

    fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = texts.len();
        let vectors = self
            .engine
            .embed(texts, None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if vectors.len() != expected {
            return Err(EmbeddingError::GenerationError(format!(
                "Model returned {} vectors for {} texts",
                vectors.len(),
                expected
            )));
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        self.run(vec![text.to_string()])?
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No vector returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping empty texts would misalign output with input ids
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at position {}",
                pos
            )));
        }

        self.run(texts.to_vec())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
