//! Optional query rewrite before retrieval

use crate::retrieval::{ChatMessage, ChatRole, CollaboratorError, QueryRewriter};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Fixed instruction given to the rewrite model
pub const REFORMULATION_INSTRUCTION: &str = "Rewrite this query to maximize retrieval recall \
over a corpus of investment news, preserving intent. Keep key terms, tickers and company names. \
Reply with the rewritten query only, on a single line, without explanations.";

/// Number of trailing chat messages included as context
pub const HISTORY_WINDOW: usize = 6;

fn label_pattern() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:(?:rewritten|reformulated|improved|search)\s+)?query\s*:\s*")
            .expect("label pattern is valid")
    })
}

/// Rewrites raw user queries through a language model
#[derive(Clone)]
pub struct QueryReformulator {
    rewriter: Arc<dyn QueryRewriter>,
}

impl QueryReformulator {
    pub fn new(rewriter: Arc<dyn QueryRewriter>) -> Self {
        Self { rewriter }
    }

    /// Rewrite `raw_text`, using recent conversation turns as context
    ///
    /// Empty model output is reported as an invalid response so the caller
    /// falls back to the raw text.
    pub async fn reformulate(
        &self,
        raw_text: &str,
        history: &[ChatMessage],
    ) -> Result<String, CollaboratorError> {
        let input = build_input(raw_text, history);
        let output = self
            .rewriter
            .complete(REFORMULATION_INSTRUCTION, &input)
            .await?;

        let rewritten = normalize_output(&output).ok_or_else(|| {
            CollaboratorError::InvalidResponse("Rewrite model returned no query".to_string())
        })?;

        debug!("Query reformulated: '{}' -> '{}'", raw_text, rewritten);

        Ok(rewritten)
    }
}

/// Render the rewrite input: recent user/assistant turns, then the query
pub fn build_input(raw_text: &str, history: &[ChatMessage]) -> String {
    let turns: Vec<String> = history
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .rev()
        .take(HISTORY_WINDOW)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|m| match m.role {
            ChatRole::User => format!("User: {}", m.content),
            _ => format!("Assistant: {}", m.content),
        })
        .collect();

    if turns.is_empty() {
        return raw_text.to_string();
    }

    format!(
        "Conversation so far:\n{}\n\nQuery: {}",
        turns.join("\n"),
        raw_text
    )
}

/// Reduce model output to a single clean query line
pub fn normalize_output(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = label_pattern().replace(line, "");
    let line = line
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '«' | '»'))
        .trim();

    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
