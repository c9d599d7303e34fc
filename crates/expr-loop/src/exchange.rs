//! One request/response exchange: validation, prompt assembly, the agent
//! loop, and the mapping of every error onto caller-visible frames.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use expr_core::{AgentError, Message, ToolExecutor};
use expr_llm::LLMProvider;

use crate::config::AgentLoopConfig;
use crate::emitter::FrameEmitter;
use crate::runner::run_agent_loop;

pub const PROMPT_REQUIRED: &str = "Prompt is required";

/// A prior turn as the caller sends it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HistoryEntry {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub text: String,
}

/// Parses the caller's history array. Invalid input is treated as empty.
pub fn parse_history(raw: Option<&str>, session_id: &str) -> Vec<HistoryEntry> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Vec::new();
    };

    match serde_json::from_str::<Vec<HistoryEntry>>(raw) {
        Ok(entries) => entries,
        Err(error) => {
            log::warn!("[{}] Ignoring invalid history: {}", session_id, error);
            Vec::new()
        }
    }
}

/// Keeps the newest `limit` entries; `sender == "user"` is the user, anyone
/// else is the assistant.
pub fn history_to_messages(entries: &[HistoryEntry], limit: usize) -> Vec<Message> {
    let start = entries.len().saturating_sub(limit);
    entries[start..]
        .iter()
        .map(|entry| {
            if entry.sender == "user" {
                Message::user(entry.text.clone())
            } else {
                Message::assistant(entry.text.clone(), None)
            }
        })
        .collect()
}

pub fn build_system_prompt(base: &str, summary: &str) -> String {
    let summary = summary.trim();
    if summary.is_empty() {
        return base.to_string();
    }
    format!("{base}\n\nConversation summary so far:\n{summary}")
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeRequest {
    pub session_id: Option<String>,
    pub prompt: Option<String>,
    pub history_json: Option<String>,
    /// Summary looked up for `session_id` before the exchange.
    pub context_summary: String,
}

impl ExchangeRequest {
    fn log_id(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or("anonymous")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStatus {
    Completed,
    RateLimited,
    /// Ended with an apology chunk and a status frame.
    Failed,
    Cancelled,
    /// Prompt missing; an error frame was sent and nothing else.
    Rejected,
}

impl ExchangeStatus {
    /// Whether the exchange reached a terminal state worth remembering.
    pub fn should_record(&self) -> bool {
        matches!(
            self,
            ExchangeStatus::Completed | ExchangeStatus::RateLimited | ExchangeStatus::Failed
        )
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeReport {
    pub status: ExchangeStatus,
    pub prompt: String,
    /// Caller history after windowing, without system prompt or the new prompt.
    pub prior_history: Vec<Message>,
    /// Model text the caller saw, without notices or apologies.
    pub reply: String,
}

/// Runs one exchange to a terminal frame.
///
/// The emitter is consumed and dropped before the tool session is closed, so
/// the caller's stream ends as soon as the last frame is out.
pub async fn run_exchange(
    request: ExchangeRequest,
    llm: &dyn LLMProvider,
    tools: &dyn ToolExecutor,
    emitter: FrameEmitter,
    cancel_token: CancellationToken,
    config: &AgentLoopConfig,
) -> ExchangeReport {
    let session_id = request.log_id().to_string();
    let prompt = request
        .prompt
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let entries = parse_history(request.history_json.as_deref(), &session_id);
    let prior_history = history_to_messages(&entries, config.max_history_messages);

    let result = if prompt.is_empty() {
        Err(AgentError::Precondition(PROMPT_REQUIRED.to_string()))
    } else {
        let mut messages = Vec::with_capacity(prior_history.len() + 2);
        messages.push(Message::system(build_system_prompt(
            &config.system_prompt,
            &request.context_summary,
        )));
        messages.extend(prior_history.iter().cloned());
        messages.push(Message::user(prompt.clone()));

        drive(
            &mut messages,
            llm,
            tools,
            &emitter,
            &cancel_token,
            config,
            &session_id,
        )
        .await
    };

    let (status, reply) = match result {
        Ok((reply, false)) => (ExchangeStatus::Completed, reply),
        Ok((reply, true)) => (ExchangeStatus::RateLimited, reply),
        Err(AgentError::Precondition(message)) => {
            log::warn!("[{}] Rejected request: {}", session_id, message);
            emitter.reject(message).await;
            (ExchangeStatus::Rejected, String::new())
        }
        Err(AgentError::Cancelled) => {
            log::info!("[{}] Exchange cancelled by caller", session_id);
            (ExchangeStatus::Cancelled, String::new())
        }
        // The loop turns rate limits into a notice itself, so one reaching
        // here is treated like any other failure.
        Err(
            error @ (AgentError::RateLimited { .. }
            | AgentError::ToolExecution { .. }
            | AgentError::InvalidArguments { .. }
            | AgentError::MalformedToolCall { .. }
            | AgentError::MaxTurnsExceeded(_)
            | AgentError::Unrecoverable(_)),
        ) => {
            log::error!("[{}] Exchange failed: {}", session_id, error);
            let _ = emitter
                .chunk(format!("\n⚠️ An error occurred: {error}"))
                .await;
            (ExchangeStatus::Failed, String::new())
        }
    };

    emitter.finish().await;
    drop(emitter);
    tools.close().await;

    log::info!("[{}] Exchange ended: {:?}", session_id, status);

    ExchangeReport {
        status,
        prompt,
        prior_history,
        reply,
    }
}

async fn drive(
    messages: &mut Vec<Message>,
    llm: &dyn LLMProvider,
    tools: &dyn ToolExecutor,
    emitter: &FrameEmitter,
    cancel_token: &CancellationToken,
    config: &AgentLoopConfig,
    session_id: &str,
) -> Result<(String, bool), AgentError> {
    let catalog = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => return Err(AgentError::Cancelled),
        catalog = tools.list_tools() => catalog,
    }
    .map_err(|error| {
        AgentError::Unrecoverable(format!("Failed to load tools: {}", error.reason()))
    })?;

    let outcome = run_agent_loop(
        messages,
        &catalog,
        llm,
        tools,
        emitter,
        cancel_token,
        config,
        session_id,
    )
    .await?;

    Ok((outcome.reply, outcome.rate_limited))
}
