//! Chat-completion client for OpenAI-compatible providers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Generation parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),
    #[error("provider returned no content")]
    EmptyResponse,
}

/// Anything that can turn a conversation into a reply.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send one chat completion request and return the trimmed reply text.
    async fn complete(
        &self,
        messages: Vec<Message>,
        params: &GenerationParams,
    ) -> Result<String, CompletionError>;
}

/// Client for the `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// `client` must already carry the request timeout; `timeout` is only
    /// reported back when it fires.
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn classify(&self, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            CompletionError::TimedOut(self.timeout)
        } else {
            CompletionError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        params: &GenerationParams,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: &params.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        debug!(
            "Sending completion request: model={}, messages={}",
            params.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        let response: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| CompletionError::Parse(e.to_string()))?;

        if let Some(usage) = &response.usage {
            info!(
                "Completion response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        first_choice_text(response)
    }
}

/// First choice's content, trimmed. Blank or missing content is an error.
fn first_choice_text(response: ChatCompletionResponse) -> Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(CompletionError::EmptyResponse)
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
