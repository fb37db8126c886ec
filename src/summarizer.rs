//! LLM summarization of feed items.
//!
//! The pipeline only sees the [`Summarizer`] trait.  [`MistralSummarizer`]
//! talks to Mistral's OpenAI-style chat completions endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SummarizeError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "Summarize the following Hacker News post for a Telegram channel. \
     Use Telegram HTML formatting, include emojis, and avoid Markdown.";

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;

pub const DEFAULT_MISTRAL_MODEL: &str = "mistral-tiny";

const MISTRAL_CHAT_URL: &str = "https://api.mistral.ai/v1/chat/completions";

/// Prompt settings passed with every summarization call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub system_prompt: String,
    pub max_output_tokens: u32,
}

impl Default for SummaryRequest {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text`.  Errors are reported, never panicked on; the
    /// pipeline turns them into "no summary".
    async fn summarize(
        &self,
        text: &str,
        system_prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, SummarizeError>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's content out of a chat completions body.
fn parse_completion(body: &str) -> Result<String, SummarizeError> {
    let resp: ChatResponse = serde_json::from_str(body)?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(SummarizeError::EmptyResponse)
}

// ---------------------------------------------------------------------------
// Mistral client
// ---------------------------------------------------------------------------

pub struct MistralSummarizer {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl MistralSummarizer {
    /// `client` should carry the request timeout.
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: MISTRAL_CHAT_URL.to_string(),
        }
    }
}

#[async_trait]
impl Summarizer for MistralSummarizer {
    async fn summarize(
        &self,
        text: &str,
        system_prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, SummarizeError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            max_tokens: max_output_tokens,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SummarizeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let summary = parse_completion(&body)?;
        debug!(model = %self.model, chars = summary.len(), "summary received");
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
