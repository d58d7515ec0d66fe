//! Completion provider client.
//!
//! Thin wrapper around the OpenAI chat completions API: callers build a
//! message sequence with [`prompt`] and exchange it for the assistant's
//! text. Provider failures, timeouts, and empty answers each surface as
//! their own error so handlers can log the cause without leaking it.

pub mod prompt;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{ChatCompletionRequestMessage, CreateChatCompletionRequest};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Upstream(#[from] async_openai::error::OpenAIError),
    #[error("completion request timed out after {0:?}")]
    TimedOut(Duration),
    #[error("completion returned no content")]
    EmptyResponse,
}

#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl CompletionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct CompletionService {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl CompletionService {
    pub fn new(config: CompletionConfig) -> Self {
        let client = Client::with_config(OpenAIConfig::new().with_api_key(config.api_key));
        Self {
            client,
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
        }
    }

    /// Send one request to the provider and return the assistant text.
    pub async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, CompletionError> {
        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_completion_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            ..Default::default()
        };

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                warn!("Completion request exceeded {:?}", self.timeout);
                CompletionError::TimedOut(self.timeout)
            })??;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        Ok(content)
    }
}
