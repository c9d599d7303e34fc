use crate::types::LLMChunk;
use async_trait::async_trait;
use expr_core::{Message, ToolSchema};
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// Provider quota exhausted. `message` is the provider's own wording, if any.
    #[error("Rate limited: {message}")]
    RateLimited { message: String },
}

impl LLMError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LLMError::RateLimited { .. })
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;

pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMChunk>> + Send>>;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Streaming chat completion with the given tool catalog.
    async fn chat_stream(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LLMStream>;

    /// Non-streaming completion without tools. Returns the reply text.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}
