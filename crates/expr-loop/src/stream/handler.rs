use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use expr_core::{AgentError, DeltaAccumulator, PendingToolCall};
use expr_llm::{LLMChunk, LLMError, LLMStream};

use crate::emitter::FrameEmitter;

pub struct StreamOutcome {
    /// Text forwarded to the caller, including a prefix cut short by a rate limit.
    pub content: String,
    pub tool_calls: Vec<PendingToolCall>,
    /// Provider message when the stream ended on a rate limit.
    pub rate_limit: Option<String>,
}

/// Forwards text fragments as they arrive and reassembles tool calls.
///
/// Text already forwarded stays forwarded if the stream later fails; the
/// caller decides what to append after it. A rate limit ends the stream
/// without an error so the forwarded prefix is not lost.
pub async fn consume_llm_stream(
    mut stream: LLMStream,
    emitter: &FrameEmitter,
    cancel_token: &CancellationToken,
    idle_timeout: Duration,
    session_id: &str,
) -> Result<StreamOutcome, AgentError> {
    let mut content = String::new();
    let mut accumulator = DeltaAccumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(AgentError::Cancelled),
            next = tokio::time::timeout(idle_timeout, stream.next()) => next,
        };

        let Ok(next) = next else {
            log::warn!(
                "[{}] LLM stream idle for {}s, aborting",
                session_id,
                idle_timeout.as_secs()
            );
            return Err(AgentError::Unrecoverable(
                "Model stream timed out".to_string(),
            ));
        };

        match next {
            None => break,
            Some(Ok(LLMChunk::Delta(delta))) => {
                if let Some(text) = accumulator.ingest(&delta) {
                    content.push_str(&text);
                    emitter.chunk(text).await?;
                }
            }
            Some(Ok(LLMChunk::Done)) => {
                log::debug!("[{}] LLM stream completed", session_id);
                break;
            }
            Some(Err(LLMError::RateLimited { message })) => {
                log::warn!("[{}] Rate limited mid-stream: {}", session_id, message);
                return Ok(StreamOutcome {
                    content,
                    tool_calls: Vec::new(),
                    rate_limit: Some(message),
                });
            }
            Some(Err(error)) => {
                log::error!("[{}] LLM stream error: {}", session_id, error);
                return Err(AgentError::Unrecoverable(error.to_string()));
            }
        }
    }

    if accumulator.has_tool_calls() {
        log::debug!(
            "[{}] Stream carried tool calls after {} bytes of text",
            session_id,
            accumulator.text_len()
        );
    }

    Ok(StreamOutcome {
        content,
        tool_calls: accumulator.finish(),
        rate_limit: None,
    })
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use tokio::sync::mpsc;

    use expr_core::{OutboundFrame, StreamDelta};
    use expr_llm::testing::{fragmented_tool_call, text_chunks};

    use super::*;

    fn build_stream(items: Vec<expr_llm::provider::Result<LLMChunk>>) -> LLMStream {
        Box::pin(stream::iter(items))
    }

    fn emitter() -> (FrameEmitter, mpsc::Receiver<OutboundFrame>, CancellationToken) {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        (FrameEmitter::new(tx, cancel.clone()), rx, cancel)
    }

    #[tokio::test]
    async fn consume_llm_stream_forwards_text_in_order() {
        let (emitter, mut rx, cancel) = emitter();
        let stream = build_stream(text_chunks("hey").into_iter().map(Ok).collect());

        let outcome = consume_llm_stream(stream, &emitter, &cancel, Duration::from_secs(5), "s1")
            .await
            .expect("stream should succeed");
        drop(emitter);

        assert_eq!(outcome.content, "hey");
        assert!(outcome.tool_calls.is_empty());
        let mut texts = Vec::new();
        while let Some(frame) = rx.recv().await {
            texts.push(frame);
        }
        assert_eq!(
            texts,
            vec![
                OutboundFrame::chunk("h"),
                OutboundFrame::chunk("e"),
                OutboundFrame::chunk("y")
            ]
        );
    }

    #[tokio::test]
    async fn consume_llm_stream_reassembles_fragmented_call() {
        let (emitter, _rx, cancel) = emitter();
        let mut chunks = fragmented_tool_call(0, "call_1", "lookupChampion", &["{\"name\":", "\"Ahri\"}"]);
        chunks.push(LLMChunk::Done);
        let stream = build_stream(chunks.into_iter().map(Ok).collect());

        let outcome = consume_llm_stream(stream, &emitter, &cancel, Duration::from_secs(5), "s1")
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].name, "lookupChampion");
        assert_eq!(outcome.tool_calls[0].arguments, "{\"name\":\"Ahri\"}");
    }

    #[tokio::test]
    async fn consume_llm_stream_keeps_prefix_on_rate_limit() {
        let (emitter, _rx, cancel) = emitter();
        let stream = build_stream(vec![
            Ok(LLMChunk::Delta(StreamDelta::text("par"))),
            Err(LLMError::RateLimited {
                message: "slow down".to_string(),
            }),
            Ok(LLMChunk::Delta(StreamDelta::text("never"))),
        ]);

        let outcome = consume_llm_stream(stream, &emitter, &cancel, Duration::from_secs(5), "s1")
            .await
            .expect("rate limit ends the stream without an error");

        assert_eq!(outcome.content, "par");
        assert!(outcome.tool_calls.is_empty());
        assert_eq!(outcome.rate_limit.as_deref(), Some("slow down"));
    }

    #[tokio::test]
    async fn consume_llm_stream_stops_on_cancel() {
        let (emitter, _rx, cancel) = emitter();
        cancel.cancel();
        let stream: LLMStream = Box::pin(stream::pending());

        let error = consume_llm_stream(stream, &emitter, &cancel, Duration::from_secs(5), "s1")
            .await
            .err()
            .unwrap();

        assert_eq!(error, AgentError::Cancelled);
    }

    #[tokio::test]
    async fn consume_llm_stream_times_out_when_idle() {
        let (emitter, _rx, cancel) = emitter();
        let stream: LLMStream = Box::pin(stream::pending());

        let error = consume_llm_stream(stream, &emitter, &cancel, Duration::from_millis(20), "s1")
            .await
            .err()
            .unwrap();

        assert!(matches!(error, AgentError::Unrecoverable(_)));
    }
}
