//! Minimal client for the Anthropic messages API, used by the Bubbles assistant.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_REPLY_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Error)]
pub enum ClaudeApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClaudeApiError {
    /// Transient failures worth another attempt
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            Self::InvalidApiKey | Self::Decode(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

impl MessagesResponse {
    /// Concatenated text blocks, or `None` when the reply carries no text
    fn into_text(self) -> Option<String> {
        let text: String = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ClaudeApiClient {
    http: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl ClaudeApiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(api_key: impl Into<String>) -> Result<Self, ClaudeApiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("roofing-workflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClaudeApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: MESSAGES_URL.to_string(),
        })
    }

    /// Send a conversation and return the assistant's text, retrying transient failures
    pub async fn reply(&self, system: &str, messages: &[Message]) -> Result<String, ClaudeApiError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_REPLY_TOKENS,
            system,
            messages,
        };

        let response = (|| async { self.send(&request).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(10))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &ClaudeApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Claude API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await?;

        response
            .into_text()
            .ok_or_else(|| ClaudeApiError::Decode("no text content in reply".to_string()))
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, ClaudeApiError> {
        debug!(model = %self.model, messages = request.messages.len(), "Sending Claude request");
        let res = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<MessagesResponse>()
                .await
                .map_err(|e| ClaudeApiError::Decode(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(ClaudeApiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(ClaudeApiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(ClaudeApiError::Http { status, body })
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ClaudeApiError {
    if e.is_timeout() {
        ClaudeApiError::Timeout
    } else {
        ClaudeApiError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ClaudeApiError::RateLimited.should_retry());
        assert!(ClaudeApiError::Timeout.should_retry());
        assert!(
            ClaudeApiError::Http {
                status: 529,
                body: String::new()
            }
            .should_retry()
        );
        assert!(
            !ClaudeApiError::Http {
                status: 400,
                body: String::new()
            }
            .should_retry()
        );
        assert!(!ClaudeApiError::InvalidApiKey.should_retry());
    }

    #[test]
    fn test_request_shape() {
        let messages = vec![Message::user("Where is project 1001?")];
        let request = MessagesRequest {
            model: DEFAULT_MODEL,
            max_tokens: MAX_REPLY_TOKENS,
            system: "You are Bubbles.",
            messages: &messages,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["system"], "You are Bubbles.");
    }

    #[test]
    fn test_response_text_skips_other_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"tool_use","id":"x"},{"type":"text","text":" On track. "}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text().as_deref(), Some("On track."));

        let empty: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert!(empty.into_text().is_none());
    }
}
