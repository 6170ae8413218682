use crate::config::Config;
use crate::error::{NewsfuseError, Result, ValidationError};
use crate::retrieval::MAX_BRANCH_FETCH;
use std::time::Duration;

/// Providers the rewrite client knows how to talk to
const VALID_PROVIDERS: [&str; 4] = ["openai", "groq", "ollama", "custom"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_timeouts(config, &mut errors);
        Self::validate_reformulation(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);

        if config.reranker.model.is_empty() {
            errors.push(ValidationError::new(
                "reranker.model",
                "Model name cannot be empty",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NewsfuseError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be at least 1",
            ));
        }

        if retrieval.top_n == 0 || retrieval.top_n > retrieval.top_k {
            errors.push(ValidationError::new(
                "retrieval.top_n",
                format!(
                    "top_n must be between 1 and top_k ({}), got {}",
                    retrieval.top_k, retrieval.top_n
                ),
            ));
        }

        if !retrieval.prefetch_ratio.is_finite() || retrieval.prefetch_ratio < 1.0 {
            errors.push(ValidationError::new(
                "retrieval.prefetch_ratio",
                format!(
                    "prefetch_ratio must be >= 1.0, got {}",
                    retrieval.prefetch_ratio
                ),
            ));
        }

        let prefetch = (retrieval.top_k as f64 * retrieval.prefetch_ratio as f64).round();
        if prefetch > MAX_BRANCH_FETCH as f64 {
            errors.push(ValidationError::new(
                "retrieval.prefetch_ratio",
                format!(
                    "top_k * prefetch_ratio must be <= {}, got {}",
                    MAX_BRANCH_FETCH, prefetch
                ),
            ));
        }

        if retrieval.branch_attempts == 0 {
            errors.push(ValidationError::new(
                "retrieval.branch_attempts",
                "branch_attempts must be at least 1",
            ));
        }

        if !retrieval.rrf_k.is_finite() || retrieval.rrf_k <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("rrf_k must be positive, got {}", retrieval.rrf_k),
            ));
        }

        if retrieval.max_concurrency == 0 {
            errors.push(ValidationError::new(
                "retrieval.max_concurrency",
                "max_concurrency must be greater than 0",
            ));
        }
    }

    fn validate_timeouts(config: &Config, errors: &mut Vec<ValidationError>) {
        let timeouts = &config.retrieval.timeouts;
        let stages = [
            ("retrieval.timeouts.request", timeouts.request),
            ("retrieval.timeouts.branch", timeouts.branch),
            ("retrieval.timeouts.rerank", timeouts.rerank),
            ("retrieval.timeouts.reformulation", timeouts.reformulation),
        ];

        for (path, value) in stages {
            if value == Duration::ZERO {
                errors.push(ValidationError::new(path, "Timeout must be greater than 0"));
            }
        }

        if timeouts.branch > timeouts.request {
            errors.push(ValidationError::new(
                "retrieval.timeouts.branch",
                "Branch timeout cannot exceed the request budget",
            ));
        }
    }

    fn validate_reformulation(config: &Config, errors: &mut Vec<ValidationError>) {
        let reformulation = &config.reformulation;

        if !VALID_PROVIDERS.contains(&reformulation.provider.as_str()) {
            errors.push(ValidationError::new(
                "reformulation.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    VALID_PROVIDERS, reformulation.provider
                ),
            ));
        }

        if reformulation.base_url.is_empty() {
            errors.push(ValidationError::new(
                "reformulation.base_url",
                "Base URL cannot be empty",
            ));
        }

        if reformulation.model.is_empty() {
            errors.push(ValidationError::new(
                "reformulation.model",
                "Model name cannot be empty",
            ));
        }

        if !(0.0..=2.0).contains(&reformulation.temperature) {
            errors.push(ValidationError::new(
                "reformulation.temperature",
                format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    reformulation.temperature
                ),
            ));
        }

        if reformulation.max_retries == 0 {
            errors.push(ValidationError::new(
                "reformulation.max_retries",
                "max_retries must be at least 1",
            ));
        }

        // Local providers run without credentials
        if config.retrieval.enable_query_reformulation && reformulation.provider != "ollama" {
            let env_var = &reformulation.api_key_env;
            match std::env::var(env_var) {
                Ok(key) if key.is_empty() => errors.push(ValidationError::new(
                    "reformulation.api_key_env",
                    format!("Environment variable {} is empty", env_var),
                )),
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::new(
                    "reformulation.api_key_env",
                    format!("Environment variable {} is not set", env_var),
                )),
            }
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "embedding.max_concurrent",
                "max_concurrent must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let indexing = &config.indexing;
        let params = [
            ("indexing.vector_dim", indexing.vector_dim),
            ("indexing.hnsw_ef_construction", indexing.hnsw_ef_construction),
            ("indexing.hnsw_m", indexing.hnsw_m),
            ("indexing.hnsw_ef_search", indexing.hnsw_ef_search),
            ("indexing.hnsw_max_elements", indexing.hnsw_max_elements),
        ];

        for (path, value) in params {
            if value == 0 {
                errors.push(ValidationError::new(path, "Value must be greater than 0"));
            }
        }
    }
}
