use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

use crate::config::LLMConfig;
use crate::types::{AppError, AppResult, LLMMessage, LLMProvider, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Rate-limited handle on the configured text provider, shared by all stages.
#[derive(Clone)]
pub struct LLM {
    adapter: Arc<dyn LLMAdapter>,
    model: String,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl LLM {
    pub fn from_config(config: &LLMConfig) -> AppResult<Self> {
        let api_key = config.active_api_key().ok_or_else(|| {
            AppError::InvalidRequest(format!(
                "No API key configured for LLM provider '{}'",
                config.provider
            ))
        })?;

        let adapter: Arc<dyn LLMAdapter> = match config.provider {
            LLMProvider::OpenAI => Arc::new(crate::llm::openai::OpenAIAdapter::openai(&api_key)),
            LLMProvider::OpenRouter => {
                Arc::new(crate::llm::openai::OpenAIAdapter::openrouter(&api_key))
            }
            LLMProvider::Groq => Arc::new(crate::llm::openai::OpenAIAdapter::groq(&api_key)),
            LLMProvider::Anthropic => {
                Arc::new(crate::llm::anthropic::AnthropicAdapter::new(&api_key))
            }
        };

        Ok(Self::with_adapter(adapter, config.model.clone())
            .with_rate_limit(config.requests_per_minute))
    }

    pub fn with_adapter(adapter: Arc<dyn LLMAdapter>, model: impl Into<String>) -> Self {
        Self {
            adapter,
            model: model.into(),
            limiter: None,
        }
    }

    /// Cap outgoing calls at `per_minute`; zero disables the limiter.
    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.limiter = NonZeroU32::new(per_minute)
            .map(|n| Arc::new(RateLimiter::direct(Quota::per_minute(n))));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        self.adapter.create_chat_completion(request).await
    }

    /// Single-turn completion returning only the text.
    pub async fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> AppResult<String> {
        let request = LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user(prompt)],
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
            system_instruction: Some(system.to_string()),
        };

        let response = self.create_chat_completion(&request).await?;
        debug!(
            model = %self.model,
            finish_reason = %response.finish_reason,
            total_tokens = response.usage.total_tokens,
            "LLM completion received"
        );

        if response.content.trim().is_empty() {
            return Err(AppError::LLMApi("Model returned an empty completion".to_string()));
        }
        Ok(response.content)
    }
}

/// Map a non-success provider response onto the error taxonomy.
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("{} API error ({}): {}", provider, status, body);

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        AppError::RateLimited(message)
    } else if status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::GATEWAY_TIMEOUT
    {
        AppError::Timeout(message)
    } else if status.is_server_error() {
        AppError::Unavailable(message)
    } else {
        AppError::LLMApi(message)
    }
}
