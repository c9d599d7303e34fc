//! Event-stream bodies returned by streaming chat completion endpoints.

use eventsource_stream::Eventsource;
use futures::future;
use futures_util::StreamExt;
use reqwest::Response;

use crate::provider::{LLMError, LLMStream, Result};
use crate::types::LLMChunk;

/// Turns a streaming completion response into an [`LLMStream`].
///
/// `parse` sees the `data` payload of every non-blank event and returns the
/// chunk to forward, or `None` to drop the event. Parse failures surface as
/// [`LLMError::Stream`]; rate limits keep their own variant so the agent loop
/// can tell the caller.
pub fn completion_stream<P>(response: Response, mut parse: P) -> LLMStream
where
    P: FnMut(&str) -> Result<Option<LLMChunk>> + Send + 'static,
{
    let chunks = response.bytes_stream().eventsource().filter_map(move |event| {
        let item = match event {
            Err(error) => Some(Err(LLMError::Stream(format!("Broken event stream: {error}")))),
            Ok(event) if event.data.trim().is_empty() => None,
            Ok(event) => parse(&event.data).map_err(into_stream_error).transpose(),
        };
        future::ready(item)
    });

    Box::pin(chunks)
}

fn into_stream_error(error: LLMError) -> LLMError {
    match error {
        LLMError::Stream(_) | LLMError::RateLimited { .. } => error,
        other => LLMError::Stream(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn network_tests_disabled() -> bool {
        std::env::var_os("CODEX_SANDBOX_NETWORK_DISABLED").is_some()
    }

    async fn serve(body: &'static str) -> (MockServer, Response) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let response = reqwest::Client::new()
            .post(format!("{}/chat/completions", server.uri()))
            .send()
            .await
            .expect("response");

        (server, response)
    }

    #[tokio::test]
    async fn blank_and_dropped_events_are_skipped() {
        if network_tests_disabled() {
            return;
        }

        let (_server, response) = serve("data: Ahri\n\ndata:\n\ndata: [DONE]\n\ndata: Lux\n\n").await;

        let chunks: Vec<_> = completion_stream(response, |data| {
            if data == "[DONE]" {
                return Ok(None);
            }
            Ok(Some(LLMChunk::token(data)))
        })
        .collect()
        .await;

        let chunks: Vec<_> = chunks.into_iter().map(|item| item.expect("chunk")).collect();
        assert_eq!(chunks, vec![LLMChunk::token("Ahri"), LLMChunk::token("Lux")]);
    }

    #[tokio::test]
    async fn parse_failures_become_stream_errors() {
        if network_tests_disabled() {
            return;
        }

        let (_server, response) = serve("data: {not json\n\n").await;

        let mut stream = completion_stream(response, |_data| Err(LLMError::Api("bad frame".into())));

        match stream.next().await {
            Some(Err(LLMError::Stream(message))) => assert!(message.contains("bad frame")),
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limits_keep_their_variant() {
        if network_tests_disabled() {
            return;
        }

        let (_server, response) = serve("data: quota\n\n").await;

        let mut stream = completion_stream(response, |data| {
            Err(LLMError::RateLimited {
                message: data.to_string(),
            })
        });

        match stream.next().await {
            Some(Err(LLMError::RateLimited { message })) => assert_eq!(message, "quota"),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }
}
