//! OpenAI-compatible chat-completions client used for query rewriting
//!
//! Works against any server speaking the `/chat/completions` protocol
//! (OpenAI, Groq, Ollama, vLLM). Transient failures are retried with
//! exponential backoff and jitter.

use crate::config::ReformulationConfig;
use crate::error::{NewsfuseError, Result};
use crate::retrieval::{CollaboratorError, QueryRewriter};
use crate::retry::backoff_delay;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatTurn<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

/// Query rewriter backed by a chat-completions endpoint
pub struct OpenAiRewriter {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    timeout: Duration,
}

impl OpenAiRewriter {
    /// Build a client from the `[reformulation]` section
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env`; only the `ollama` provider may run without one.
    pub fn from_config(config: &ReformulationConfig, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() && config.provider != "ollama" {
            return Err(NewsfuseError::Config(format!(
                "Environment variable {} is not set (required by provider '{}')",
                config.api_key_env, config.provider
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NewsfuseError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_attempts: config.max_retries.max(1),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            timeout,
        })
    }

    /// Override the retry backoff window
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    async fn attempt(
        &self,
        instruction: &str,
        text: &str,
    ) -> std::result::Result<String, CollaboratorError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatTurn {
                    role: "system",
                    content: instruction,
                },
                ChatTurn {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CollaboratorError::InvalidResponse("No completion choices".to_string()))
    }
}

#[async_trait]
impl QueryRewriter for OpenAiRewriter {
    async fn complete(
        &self,
        instruction: &str,
        text: &str,
    ) -> std::result::Result<String, CollaboratorError> {
        let mut last_err = CollaboratorError::Failed("no attempt made".to_string());

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.initial_backoff, self.max_backoff, attempt);
                debug!(
                    "Rewrite retry {}/{} after {:?}",
                    attempt,
                    self.max_attempts - 1,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(instruction, text).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retryable() => {
                    warn!("Rewrite attempt {} failed: {}", attempt + 1, e);
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }
}

fn classify_transport(error: &reqwest::Error, timeout: Duration) -> CollaboratorError {
    if error.is_timeout() {
        CollaboratorError::Timeout(timeout)
    } else if error.is_connect() || error.is_request() {
        CollaboratorError::Unavailable(error.to_string())
    } else {
        CollaboratorError::Failed(error.to_string())
    }
}

fn classify_status(status: StatusCode, detail: &str) -> CollaboratorError {
    let message = if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => CollaboratorError::Unavailable(message),
        _ => CollaboratorError::Failed(message),
    }
}
