// OpenAI-compatible chat completions adapter
// OpenAI, OpenRouter and Groq all speak the same wire format; only the base URL differs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::provider::{error_from_response, LLMAdapter};
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

pub struct OpenAIAdapter {
    client: Client,
    api_key: String,
    api_base: String,
    provider_name: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAIAdapter {
    pub fn openai(api_key: &str) -> Self {
        Self::new_with_api_base(api_key, OPENAI_API_BASE, "OpenAI")
    }

    pub fn openrouter(api_key: &str) -> Self {
        Self::new_with_api_base(api_key, OPENROUTER_API_BASE, "OpenRouter")
    }

    pub fn groq(api_key: &str) -> Self {
        Self::new_with_api_base(api_key, GROQ_API_BASE, "Groq")
    }

    pub fn new_with_api_base(api_key: &str, api_base: &str, provider_name: &'static str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            provider_name,
        }
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/chat/completions", self.api_base);

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: &m.role,
            content: &m.content,
        }));

        let body = ChatRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(self.provider_name, response).await);
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            AppError::LLMApi(format!("Failed to parse {} response: {}", self.provider_name, e))
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            AppError::LLMApi(format!("{} returned no choices", self.provider_name))
        })?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}
