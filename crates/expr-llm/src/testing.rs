//! Scripted provider for exercising the agent loop without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use expr_core::{Message, StreamDelta, ToolCallDelta, ToolSchema};
use futures::StreamExt;

use crate::provider::{LLMError, LLMProvider, LLMStream, Result};
use crate::types::LLMChunk;

/// What one `chat_stream` call produces.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Chunks(Vec<LLMChunk>),
    /// Chunks followed by an in-stream rate limit error.
    RateLimitedAfter(Vec<LLMChunk>, String),
    /// Rate limit returned before any streaming starts.
    RateLimited(String),
    /// Non-retryable provider failure before streaming.
    Fail(String),
    /// A stream that never yields.
    Hang,
}

#[derive(Default)]
struct Inner {
    turns: VecDeque<ScriptedTurn>,
    summaries: VecDeque<std::result::Result<String, String>>,
    seen_messages: Vec<Vec<Message>>,
    seen_tools: Vec<Vec<ToolSchema>>,
    completions: Vec<Vec<Message>>,
}

#[derive(Clone, Default)]
pub struct MockLLMProvider {
    inner: Arc<Mutex<Inner>>,
}

impl MockLLMProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        let provider = Self::default();
        provider.lock().turns = turns.into();
        provider
    }

    /// Single turn that streams `text` one character at a time.
    pub fn with_text_response(text: &str) -> Self {
        Self::new(vec![ScriptedTurn::Chunks(text_chunks(text))])
    }

    /// Queue the reply for the next non-streaming completion.
    pub fn push_summary(&self, reply: std::result::Result<&str, &str>) {
        self.lock()
            .summaries
            .push_back(reply.map(str::to_string).map_err(str::to_string));
    }

    pub fn stream_calls(&self) -> Vec<Vec<Message>> {
        self.lock().seen_messages.clone()
    }

    pub fn tools_seen(&self) -> Vec<Vec<ToolSchema>> {
        self.lock().seen_tools.clone()
    }

    pub fn completion_calls(&self) -> Vec<Vec<Message>> {
        self.lock().completions.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub fn text_chunks(text: &str) -> Vec<LLMChunk> {
    let mut chunks: Vec<_> = text.chars().map(|c| LLMChunk::token(c.to_string())).collect();
    chunks.push(LLMChunk::Done);
    chunks
}

/// A tool call whose name arrives in its own fragment and whose arguments
/// are split at every entry of `arg_pieces`.
pub fn fragmented_tool_call(index: u32, id: &str, name: &str, arg_pieces: &[&str]) -> Vec<LLMChunk> {
    let mut chunks = vec![LLMChunk::Delta(StreamDelta::tool_call(ToolCallDelta {
        index,
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        arguments: None,
    }))];
    chunks.extend(arg_pieces.iter().map(|piece| {
        LLMChunk::Delta(StreamDelta::tool_call(ToolCallDelta {
            index,
            arguments: Some(piece.to_string()),
            ..Default::default()
        }))
    }));
    chunks
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn chat_stream(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LLMStream> {
        let turn = {
            let mut inner = self.lock();
            inner.seen_messages.push(messages.to_vec());
            inner.seen_tools.push(tools.to_vec());
            inner.turns.pop_front()
        };

        match turn {
            None => Err(LLMError::Api("script exhausted".to_string())),
            Some(ScriptedTurn::Chunks(chunks)) => {
                Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
            }
            Some(ScriptedTurn::RateLimitedAfter(chunks, message)) => {
                let tail = futures::stream::once(async move { Err(LLMError::RateLimited { message }) });
                Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)).chain(tail)))
            }
            Some(ScriptedTurn::RateLimited(message)) => Err(LLMError::RateLimited { message }),
            Some(ScriptedTurn::Fail(message)) => Err(LLMError::Api(message)),
            Some(ScriptedTurn::Hang) => Ok(Box::pin(futures::stream::pending())),
        }
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let reply = {
            let mut inner = self.lock();
            inner.completions.push(messages.to_vec());
            inner.summaries.pop_front()
        };

        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LLMError::Api(message)),
            None => Err(LLMError::Api("no summary scripted".to_string())),
        }
    }
}
