use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{Answer, ExplanationError, ExplanationProvider};
use crate::config::ExplanationConfig;

/// Verse text beyond this many characters is cut from the prompt.
pub const MAX_VERSE_CHARS: usize = 1000;

/// Context beyond this many characters is cut from an answer prompt.
pub const MAX_CONTEXT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You explain how a scripture verse relates to a reader's question. Answer in two or three plain sentences and do not quote the verse back.";

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions using only the given context. Reply with a JSON object {\"answer\": string, \"score\": number} where answer is the shortest span of the context that answers the question and score is your confidence from 0 to 1. If the context does not answer the question, reply {\"answer\": \"\", \"score\": 0}.";

/// Client for any endpoint speaking the OpenAI chat completions protocol.
pub struct OpenAiCompatibleProvider {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    // Built on first use so construction is safe inside an async runtime.
    client: OnceLock<Client>,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &ExplanationConfig, api_key: Option<String>) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_millis(config.timeout_ms),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client, ExplanationError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ExplanationError::Client(e.to_string()))?;
        Ok(self.client.get_or_init(|| client))
    }

    fn headers(&self) -> Result<HeaderMap, ExplanationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let auth = format!("Bearer {}", key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth)
                    .map_err(|_| ExplanationError::Client("invalid API key".to_string()))?,
            );
        }
        Ok(headers)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

/// User prompt for one verse, with the verse text truncated.
pub(crate) fn build_prompt(query: &str, verse_text: &str) -> String {
    let truncated = truncate_chars(verse_text, MAX_VERSE_CHARS);
    format!("Question: {query}\n\nVerse: {truncated}\n\nSummarize the meaning of the verse as it relates to the question.")
}

pub(crate) fn build_answer_prompt(question: &str, context: &str) -> String {
    let truncated = truncate_chars(context, MAX_CONTEXT_CHARS);
    format!("Context:\n{truncated}\n\nQuestion: {question}")
}

/// Reads the model's JSON reply, tolerating a markdown code fence.
///
/// A reply that is not JSON is taken as the answer itself with a zero score.
pub(crate) fn parse_answer(content: &str) -> Answer {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim);

    match serde_json::from_str::<Answer>(unfenced) {
        Ok(parsed) => Answer {
            answer: parsed.answer.trim().to_string(),
            score: if parsed.score.is_finite() {
                parsed.score.clamp(0.0, 1.0)
            } else {
                0.0
            },
        },
        Err(_) => Answer {
            answer: trimmed.to_string(),
            score: 0.0,
        },
    }
}

impl OpenAiCompatibleProvider {
    /// One chat completion; returns the first non-empty choice.
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ExplanationError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let resp = self
            .client()?
            .post(format!("{}/chat/completions", self.endpoint))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .map_err(|e| ExplanationError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ExplanationError::Status { status, body });
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| ExplanationError::Request(format!("invalid response body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .map(|choice| choice.message.content.trim().to_string())
            .find(|content| !content.is_empty())
            .ok_or(ExplanationError::EmptyResponse)
    }
}

impl ExplanationProvider for OpenAiCompatibleProvider {
    fn explain(&self, query: &str, verse_text: &str) -> Result<String, ExplanationError> {
        self.complete(SYSTEM_PROMPT, &build_prompt(query, verse_text))
    }

    fn answer(&self, question: &str, context: &str) -> Result<Answer, ExplanationError> {
        let content = self.complete(
            ANSWER_SYSTEM_PROMPT,
            &build_answer_prompt(question, context),
        )?;
        Ok(parse_answer(&content))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}
