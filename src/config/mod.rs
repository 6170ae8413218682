//! Configuration management for newsfuse
//!
//! Service-wide defaults live in a TOML file and are passed explicitly into
//! each pipeline at construction, so differently configured pipelines can
//! coexist in one process.

use crate::error::{NewsfuseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Smoothing constant for Reciprocal Rank Fusion
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub retrieval: RetrievalConfig,
    pub reformulation: ReformulationConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Service-wide retrieval defaults and pipeline tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidate-set size fed to fusion and kept after it
    pub top_k: usize,
    /// Final number of results returned
    pub top_n: usize,
    /// Multiplier on `top_k` for the per-branch fetch count
    pub prefetch_ratio: f32,
    /// Rerank fused candidates by default
    pub use_rerank: bool,
    /// Rewrite queries before retrieval by default
    pub enable_query_reformulation: bool,
    /// RRF smoothing constant; fixed for the lifetime of a pipeline
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Maximum concurrent outbound collaborator calls per pipeline
    pub max_concurrency: usize,
    /// Attempts per branch search, including the first; only transient
    /// errors are retried, within the branch timeout
    #[serde(default = "default_branch_attempts")]
    pub branch_attempts: u32,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

fn default_rrf_k() -> f32 {
    DEFAULT_RRF_K
}

fn default_branch_attempts() -> u32 {
    2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            top_n: 10,
            prefetch_ratio: 1.0,
            use_rerank: true,
            enable_query_reformulation: false,
            rrf_k: DEFAULT_RRF_K,
            max_concurrency: 16,
            branch_attempts: default_branch_attempts(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Stage time budgets. Written as "500ms", "5s", "1m" in TOML.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Overall budget for one request
    #[serde(with = "duration_str")]
    pub request: Duration,
    /// Sub-timeout for each retrieval branch
    #[serde(with = "duration_str")]
    pub branch: Duration,
    #[serde(with = "duration_str")]
    pub rerank: Duration,
    #[serde(with = "duration_str")]
    pub reformulation: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            branch: Duration::from_secs(10),
            rerank: Duration::from_secs(10),
            reformulation: Duration::from_secs(8),
        }
    }
}

/// Query-rewrite language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReformulationConfig {
    pub provider: String,
    /// Base URL of an OpenAI-compatible API (".../v1")
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Attempts per rewrite, including the first
    pub max_retries: u32,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
    /// Concurrent embedding batches during indexing
    pub max_concurrent: usize,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub vector_dim: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
    pub hnsw_max_elements: usize,
    /// Directory for the keyword index; in-memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_dir: Option<PathBuf>,
}

/// Cross-encoder reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub model: String,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefetch_ratio: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_rerank: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_query_reformulation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NewsfuseError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| NewsfuseError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| NewsfuseError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| NewsfuseError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        if let Some(top_n) = overrides.top_n {
            self.retrieval.top_n = top_n;
        }
        if let Some(ratio) = overrides.prefetch_ratio {
            self.retrieval.prefetch_ratio = ratio;
        }
        if let Some(use_rerank) = overrides.use_rerank {
            self.retrieval.use_rerank = use_rerank;
        }
        if let Some(enabled) = overrides.enable_query_reformulation {
            self.retrieval.enable_query_reformulation = enabled;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }

        ConfigValidator::validate(self)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: NEWSFUSE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("NEWSFUSE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_env(path, value)?,
            "RETRIEVAL__TOP_N" => self.retrieval.top_n = parse_env(path, value)?,
            "RETRIEVAL__PREFETCH_RATIO" => self.retrieval.prefetch_ratio = parse_env(path, value)?,
            "RETRIEVAL__USE_RERANK" => self.retrieval.use_rerank = parse_env(path, value)?,
            "RETRIEVAL__BRANCH_ATTEMPTS" => {
                self.retrieval.branch_attempts = parse_env(path, value)?
            }
            "RETRIEVAL__ENABLE_QUERY_REFORMULATION" => {
                self.retrieval.enable_query_reformulation = parse_env(path, value)?
            }
            "REFORMULATION__MODEL" => self.reformulation.model = value.to_string(),
            "REFORMULATION__BASE_URL" => self.reformulation.base_url = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "RERANKER__MODEL" => self.reranker.model = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| NewsfuseError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("newsfuse").join("config.toml"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| NewsfuseError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for ReformulationConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 200,
            max_retries: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            retrieval: RetrievalConfig::default(),
            reformulation: ReformulationConfig::default(),
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
                max_concurrent: 4,
            },
            indexing: IndexingConfig {
                vector_dim: 384,
                hnsw_ef_construction: 200,
                hnsw_m: 16,
                hnsw_ef_search: 64,
                hnsw_max_elements: 100_000,
                keyword_dir: None,
            },
            reranker: RerankerConfig {
                model: "BAAI/bge-reranker-base".to_string(),
            },
            profiles: HashMap::new(),
        }
    }
}

/// Parse durations like "250ms", "5s", "2m", "1h"; bare numbers are seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = digits.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

/// Format a duration the way `parse_duration` reads it
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        format!("{}ms", millis)
    } else {
        format!("{}s", duration.as_secs())
    }
}

mod duration_str {
    use super::{format_duration, parse_duration};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw)
            .ok_or_else(|| D::Error::custom(format!("Invalid duration format: {}", raw)))
    }
}
