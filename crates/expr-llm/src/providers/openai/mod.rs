use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};

use crate::provider::{LLMError, LLMProvider, LLMStream, Result};
use crate::types::LLMChunk;
use expr_core::{Message, ToolSchema};

use super::common::errors::classify_error_response;
use super::common::openai_compat::{
    build_openai_compat_body, parse_openai_compat_completion, parse_openai_compat_sse_data_strict,
};
use super::common::sse::completion_stream;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-120b";

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    request_timeout: Option<Duration>,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Bounds connection setup for every call.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        match Client::builder().connect_timeout(timeout).build() {
            Ok(client) => self.client = client,
            Err(e) => log::warn!("Failed to build HTTP client with connect timeout: {}", e),
        }
        self
    }

    /// Bounds the whole non-streaming completion, and the wait for response
    /// headers on a stream. Gaps inside a running stream are bounded by the caller.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, body: &serde_json::Value, timeout: Option<Duration>) -> Result<Response> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body);

        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let error = classify_error_response(status, &text);
            log::warn!("Chat completion rejected: {}", error);
            return Err(error);
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat_stream(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LLMStream> {
        log::debug!(
            "Streaming completion: model={}, messages={}, tools={}",
            self.model,
            messages.len(),
            tools.len()
        );

        let body = build_openai_compat_body(&self.model, messages, tools, true);
        let response = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.post(&body, None))
                .await
                .map_err(|_| {
                    LLMError::Stream(format!("No response headers within {}ms", limit.as_millis()))
                })??,
            None => self.post(&body, None).await?,
        };

        let stream = completion_stream(response, |data| {
            match parse_openai_compat_sse_data_strict(data)? {
                LLMChunk::Delta(delta) if delta.is_empty() => Ok(None),
                other => Ok(Some(other)),
            }
        });

        Ok(stream)
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let body = build_openai_compat_body(&self.model, messages, &[], false);
        let response = self.post(&body, self.request_timeout).await?;
        let text = response.text().await?;
        parse_openai_compat_completion(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn network_tests_disabled() -> bool {
        std::env::var_os("CODEX_SANDBOX_NETWORK_DISABLED").is_some()
    }

    #[test]
    fn test_default_values() {
        let provider = OpenAIProvider::new("test_key");
        assert_eq!(provider.api_key, "test_key");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_chained_builders() {
        let provider = OpenAIProvider::new("test_key")
            .with_base_url("https://custom.example.com/v1/")
            .with_model("llama-3.3-70b")
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(provider.base_url, "https://custom.example.com/v1");
        assert_eq!(provider.model(), "llama-3.3-70b");
        assert_eq!(provider.request_timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn chat_stream_yields_deltas_and_skips_done() {
        if network_tests_disabled() {
            return;
        }

        let server = MockServer::start().await;
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Ahri \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"is a mage.\"}}]}\n\n",
            "data: [DONE]\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"stream": true, "model": "test-model"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("sk-test")
            .with_base_url(server.uri())
            .with_model("test-model");

        let mut stream = provider
            .chat_stream(&[Message::user("Who is Ahri?")], &[])
            .await
            .expect("stream");

        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.expect("chunk"));
        }

        assert_eq!(
            chunks,
            vec![LLMChunk::token("Ahri "), LLMChunk::token("is a mage."), LLMChunk::Done]
        );
    }

    #[tokio::test]
    async fn chat_stream_maps_429_to_rate_limit() {
        if network_tests_disabled() {
            return;
        }

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached for model", "code": "rate_limit_exceeded"}
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("sk-test").with_base_url(server.uri());
        let result = provider.chat_stream(&[Message::user("hi")], &[]).await;

        match result {
            Err(LLMError::RateLimited { message }) => {
                assert_eq!(message, "Rate limit reached for model")
            }
            Err(other) => panic!("expected rate limit, got {other:?}"),
            Ok(_) => panic!("expected rate limit, got stream"),
        }
    }

    #[tokio::test]
    async fn chat_stream_gives_up_when_headers_stall() {
        if network_tests_disabled() {
            return;
        }

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data: [DONE]\n\n", "text/event-stream")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("sk-test")
            .with_base_url(server.uri())
            .with_connect_timeout(Duration::from_millis(100))
            .with_request_timeout(Duration::from_millis(200));

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            provider.chat_stream(&[Message::user("hi")], &[]),
        )
        .await
        .expect("stalled provider must not hold the turn open");

        match result {
            Err(LLMError::Stream(message)) => assert!(message.contains("200ms"), "{message}"),
            Err(other) => panic!("expected header timeout, got {other:?}"),
            Ok(_) => panic!("expected header timeout, got stream"),
        }
    }

    #[tokio::test]
    async fn complete_returns_message_content() {
        if network_tests_disabled() {
            return;
        }

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "User asked about Ahri."}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("sk-test").with_base_url(server.uri());
        let text = provider
            .complete(&[Message::system("Summarize"), Message::user("Who is Ahri?")])
            .await
            .expect("completion");

        assert_eq!(text, "User asked about Ahri.");
    }
}
