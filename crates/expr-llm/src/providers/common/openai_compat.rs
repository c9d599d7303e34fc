//! OpenAI-compatible request serialization and stream parsing.
//!
//! The body builders never leak internal [`Message`] fields such as `id` or
//! `created_at`.

use expr_core::{Message, StreamDelta, ToolCallDelta, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Value};

use super::errors::{classify_stream_error, ErrorBody};
use crate::provider::{LLMError, Result};
use crate::types::LLMChunk;

/// Convert internal [`Message`] values to an OpenAI-compatible JSON array.
pub fn messages_to_openai_compat_json(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({
                "role": m.role.as_str(),
                "content": m.content,
            });

            if let Some(tool_call_id) = &m.tool_call_id {
                msg["tool_call_id"] = json!(tool_call_id);
            }

            if let Some(tool_calls) = &m.tool_calls {
                msg["tool_calls"] = json!(tool_calls);
            }

            msg
        })
        .collect()
}

pub fn tools_to_openai_compat_json(tools: &[ToolSchema]) -> Vec<Value> {
    tools.iter().map(|t| json!(t)).collect()
}

/// Build an OpenAI-compatible chat request body.
///
/// The `tools` key is omitted entirely when the catalog is empty; several
/// compatible providers reject an empty array.
pub fn build_openai_compat_body(
    model: &str,
    messages: &[Message],
    tools: &[ToolSchema],
    stream: bool,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages_to_openai_compat_json(messages),
        "stream": stream,
    });

    if !tools.is_empty() {
        body["tools"] = json!(tools_to_openai_compat_json(tools));
        body["tool_choice"] = json!("auto");
    }

    body
}

// --- Content shapes ---

/// Message content as either a plain string or a list of parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OpenAICompatContent {
    Text(String),
    Parts(Vec<OpenAICompatContentPart>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OpenAICompatContentPart {
    Text(String),
    Object {
        #[serde(default)]
        text: Option<String>,
    },
}

impl OpenAICompatContent {
    pub fn into_text(self) -> String {
        match self {
            OpenAICompatContent::Text(text) => text,
            OpenAICompatContent::Parts(parts) => parts
                .into_iter()
                .filter_map(|part| match part {
                    OpenAICompatContentPart::Text(text) => Some(text),
                    OpenAICompatContentPart::Object { text } => text,
                })
                .collect(),
        }
    }
}

// --- Streaming chunk parsing ---

#[derive(Debug, Deserialize)]
pub struct OpenAICompatStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAICompatChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAICompatChoice {
    #[serde(default)]
    delta: OpenAICompatDelta,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAICompatDelta {
    #[serde(default)]
    content: Option<OpenAICompatContent>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAICompatToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAICompatToolCallDelta {
    #[serde(default)]
    index: Option<u32>,
    id: Option<String>,
    function: Option<OpenAICompatFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAICompatFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Convert a single OpenAI-compatible stream chunk into a [`StreamDelta`].
///
/// Only the first choice is read. A tool fragment without an index is
/// addressed as index 0.
pub fn parse_openai_compat_chunk(chunk: OpenAICompatStreamChunk) -> Result<StreamDelta> {
    if let Some(error) = chunk.error {
        return Err(classify_stream_error(error));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(StreamDelta::default());
    };

    let text = choice
        .delta
        .content
        .map(OpenAICompatContent::into_text)
        .filter(|text| !text.is_empty());

    let tool_calls = choice
        .delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            ToolCallDelta {
                index: tc.index.unwrap_or(0),
                id: tc.id,
                name,
                arguments,
            }
        })
        .collect();

    Ok(StreamDelta { text, tool_calls })
}

/// Parse an SSE `data:` payload.
///
/// - `"[DONE]"` -> `LLMChunk::Done`
/// - Invalid JSON -> error
pub fn parse_openai_compat_sse_data_strict(data: &str) -> Result<LLMChunk> {
    if data.trim() == "[DONE]" {
        return Ok(LLMChunk::Done);
    }

    let chunk: OpenAICompatStreamChunk = serde_json::from_str(data)?;
    parse_openai_compat_chunk(chunk).map(LLMChunk::Delta)
}

// --- Non-streaming completion parsing ---

#[derive(Debug, Deserialize)]
struct OpenAICompatCompletion {
    #[serde(default)]
    choices: Vec<OpenAICompatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAICompatCompletionChoice {
    message: OpenAICompatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAICompatCompletionMessage {
    #[serde(default)]
    content: Option<OpenAICompatContent>,
}

/// Extract the reply text from a non-streaming completion body.
pub fn parse_openai_compat_completion(body: &str) -> Result<String> {
    let completion: OpenAICompatCompletion = serde_json::from_str(body)?;
    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| {
            choice
                .message
                .content
                .map(OpenAICompatContent::into_text)
                .unwrap_or_default()
        })
        .ok_or_else(|| LLMError::Api("completion returned no choices".to_string()))
}
