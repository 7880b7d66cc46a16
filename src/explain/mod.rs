//! Optional natural-language explanations for search matches.
//!
//! A provider turns `(query, verse_text)` into a short explanation. Calls are
//! best effort: the query service substitutes a placeholder when a call
//! fails or exceeds its timeout, and never surfaces [`ExplanationError`] to
//! its caller.
//!
//! The same provider answers a question from a passage of context. Unlike
//! explanations, a failed answer is reported to the caller.

mod openai;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ExplanationConfig;

pub use openai::{MAX_CONTEXT_CHARS, MAX_VERSE_CHARS, OpenAiCompatibleProvider};

/// Text attached to a match whose explanation could not be produced.
pub const DEFAULT_PLACEHOLDER: &str = "Explanation unavailable.";

#[derive(Error, Debug)]
pub enum ExplanationError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Explanation request failed: {0}")]
    Request(String),

    #[error("Explanation endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Explanation endpoint returned no content")]
    EmptyResponse,

    #[error("Explanation endpoint did not respond within {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

/// An answer extracted from a context passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    /// Confidence in `0.0..=1.0`
    pub score: f32,
}

/// Produces an explanation of how a verse relates to a query.
///
/// Implementations block; the query service runs them on the blocking pool.
pub trait ExplanationProvider: Send + Sync {
    fn explain(&self, query: &str, verse_text: &str) -> Result<String, ExplanationError>;

    /// Answers `question` using only what `context` says.
    fn answer(&self, question: &str, context: &str) -> Result<Answer, ExplanationError>;
}

/// Builds the configured provider, or `None` when explanations are disabled.
pub fn create_provider(config: &ExplanationConfig) -> Option<Arc<dyn ExplanationProvider>> {
    if !config.enabled {
        return None;
    }

    let api_key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty());
    if api_key.is_none() {
        tracing::debug!(
            env = %config.api_key_env,
            "no API key found for explanation provider, sending unauthenticated requests"
        );
    }

    tracing::debug!(endpoint = %config.endpoint, model = %config.model, "explanations enabled");
    Some(Arc::new(OpenAiCompatibleProvider::new(config, api_key)))
}
