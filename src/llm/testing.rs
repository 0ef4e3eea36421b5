//! Scripted provider doubles for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{GeneratedImage, ImageGenerator, LLMAdapter, LLM};
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

/// Replies with queued responses in order and records every request.
pub(crate) struct ScriptedAdapter {
    replies: Mutex<VecDeque<AppResult<String>>>,
    pub(crate) requests: Mutex<Vec<LLMRequest>>,
}

impl ScriptedAdapter {
    pub(crate) fn new(replies: Vec<AppResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn last_prompt(&self) -> String {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|r| r.messages[0].content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LLMAdapter for ScriptedAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::LLMApi("script exhausted".to_string())))?;
        Ok(LLMResponse {
            content: reply,
            finish_reason: "stop".to_string(),
            usage: TokenUsage::default(),
        })
    }
}

pub(crate) fn scripted_llm(replies: &[&str]) -> (LLM, Arc<ScriptedAdapter>) {
    let adapter = ScriptedAdapter::new(replies.iter().map(|r| Ok(r.to_string())).collect());
    (LLM::with_adapter(adapter.clone(), "test-model"), adapter)
}

pub(crate) struct FixedImageGenerator {
    pub(crate) url: String,
    pub(crate) prompts: Mutex<Vec<String>>,
}

impl FixedImageGenerator {
    pub(crate) fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageGenerator for FixedImageGenerator {
    async fn generate(&self, prompt: &str) -> AppResult<GeneratedImage> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(GeneratedImage {
            url: self.url.clone(),
        })
    }
}
