//! Text-generation collaborator.
//!
//! [`TextGenerator`] is the only thing the analysis layer knows about the
//! language model: a prompt goes in, free-form text comes out. The default
//! [`OpenAiGenerator`] calls the OpenAI chat-completions API.
//!
//! A single call is one attempt. Retrying is the caller's job, through a
//! shared [`RetryPolicy`](crate::retry::RetryPolicy); the error type tells
//! the policy what is worth retrying:
//! - HTTP 429 and 5xx, network errors, timeouts → transient
//! - other HTTP 4xx, missing credentials, malformed bodies → permanent

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::retry::RetryableError;

/// A prompt for the generation service.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation service unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("generation request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("generation service not configured: {0}")]
    NotConfigured(String),
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

impl RetryableError for GenerationError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Timeout(_)
                | GenerationError::Unavailable { .. }
                | GenerationError::Network(_)
        )
    }

    fn timed_out(after: Duration) -> Self {
        GenerationError::Timeout(after)
    }
}

/// Prompt in, free-form text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, for logs and response metadata.
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

// ============ OpenAI ============

/// Chat-completions client.
///
/// Reads the API key at construction time; a missing key is not an error
/// until the first call, so the server can still serve retrieval endpoints.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: Option<String>,
    config: GenerationConfig,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set; analysis aspects will fail");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::NotConfigured("OPENAI_API_KEY not set".to_string()))?;

        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        });

        let resp = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(Duration::from_secs(self.config.timeout_secs))
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| GenerationError::Malformed(e.to_string()))?;
            return parse_chat_response(&json);
        }

        let message = resp.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(GenerationError::Unavailable {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(GenerationError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, GenerationError> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| GenerationError::Malformed("missing choices[0].message.content".into()))?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  SCAM: NO\nFine.  " } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "SCAM: NO\nFine.");
    }

    #[test]
    fn missing_content_is_malformed() {
        let json = serde_json::json!({ "choices": [] });
        assert!(matches!(
            parse_chat_response(&json),
            Err(GenerationError::Malformed(_))
        ));
    }

    #[test]
    fn transient_classification() {
        assert!(GenerationError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(GenerationError::Unavailable {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!GenerationError::Rejected {
            status: 401,
            message: String::new()
        }
        .is_transient());
        assert!(!GenerationError::Malformed(String::new()).is_transient());
    }
}
