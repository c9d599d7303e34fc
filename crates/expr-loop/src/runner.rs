use serde_json::json;
use tokio_util::sync::CancellationToken;

use expr_core::{
    dispatch_tool_call, parse_tool_args, AgentError, Message, PendingToolCall, ToolExecutor,
    ToolSchema,
};
use expr_llm::{LLMError, LLMProvider};

use crate::config::{AgentLoopConfig, ToolCallPolicy};
use crate::emitter::FrameEmitter;
use crate::stream::consume_llm_stream;

const DEFAULT_RATE_LIMIT_NOTICE: &str = "Rate limit reached. Please retry shortly.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopOutcome {
    /// Model text forwarded across all turns, without notices.
    pub reply: String,
    pub rate_limited: bool,
}

/// Drives model turns until a plain answer, a rate limit, or an error.
///
/// `history` must end with the user prompt. Assistant and tool messages are
/// appended to it as the loop progresses.
#[allow(clippy::too_many_arguments)]
pub async fn run_agent_loop(
    history: &mut Vec<Message>,
    catalog: &[ToolSchema],
    llm: &dyn LLMProvider,
    tools: &dyn ToolExecutor,
    emitter: &FrameEmitter,
    cancel_token: &CancellationToken,
    config: &AgentLoopConfig,
    session_id: &str,
) -> Result<LoopOutcome, AgentError> {
    let debug_logger = DebugLogger::new(log::log_enabled!(log::Level::Debug));
    let mut reply = String::new();

    log::info!(
        "[{}] Starting agent loop: {} messages, {} tools, max {} turns",
        session_id,
        history.len(),
        catalog.len(),
        config.max_turns
    );

    for turn in 1..=config.max_turns {
        if cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let timer = Timer::new(format!("llm_turn_{turn}"));
        let stream = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(AgentError::Cancelled),
            stream = llm.chat_stream(history.as_slice(), catalog) => stream,
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(LLMError::RateLimited { message }) => {
                log::warn!("[{}] Rate limited before streaming: {}", session_id, message);
                emit_rate_limit_notice(emitter, &message).await?;
                return Ok(LoopOutcome {
                    reply,
                    rate_limited: true,
                });
            }
            Err(error) => {
                log::error!("[{}] LLM request failed: {}", session_id, error);
                return Err(AgentError::Unrecoverable(error.to_string()));
            }
        };

        let outcome = consume_llm_stream(
            stream,
            emitter,
            cancel_token,
            config.stream_idle_timeout,
            session_id,
        )
        .await?;
        timer.debug(session_id);

        reply.push_str(&outcome.content);

        if let Some(message) = outcome.rate_limit {
            emit_rate_limit_notice(emitter, &message).await?;
            return Ok(LoopOutcome {
                reply,
                rate_limited: true,
            });
        }

        if outcome.tool_calls.is_empty() {
            debug_logger.log_event(
                session_id,
                "turn_complete",
                json!({ "turn": turn, "content_len": outcome.content.len() }),
            );
            history.push(Message::assistant(outcome.content, None));
            log::info!("[{}] Agent loop finished after {} turn(s)", session_id, turn);
            return Ok(LoopOutcome {
                reply,
                rate_limited: false,
            });
        }

        if turn == config.max_turns {
            log::warn!(
                "[{}] Model still requesting tools after {} turns",
                session_id,
                config.max_turns
            );
            return Err(AgentError::MaxTurnsExceeded(config.max_turns));
        }

        let selected = select_tool_calls(outcome.tool_calls, config.tool_call_policy);
        if let Some(malformed) = selected.iter().find(|call| call.name.is_empty()) {
            log::warn!(
                "[{}] Tool call at index {} arrived without a name",
                session_id,
                malformed.index
            );
            return Err(AgentError::MalformedToolCall {
                index: malformed.index,
            });
        }

        debug_logger.log_event(
            session_id,
            "tool_calls",
            json!({
                "turn": turn,
                "calls": selected.iter().map(|call| &call.name).collect::<Vec<_>>(),
            }),
        );

        history.push(Message::assistant(
            outcome.content,
            Some(selected.iter().map(PendingToolCall::to_tool_call).collect()),
        ));

        for call in &selected {
            let result = execute_tool_call(call, tools, cancel_token, session_id).await?;
            history.push(Message::tool_result(call.id.clone(), result));
        }
    }

    // Only reachable when max_turns is zero.
    Err(AgentError::MaxTurnsExceeded(config.max_turns))
}

fn select_tool_calls(calls: Vec<PendingToolCall>, policy: ToolCallPolicy) -> Vec<PendingToolCall> {
    match policy {
        ToolCallPolicy::FirstOnly => calls.into_iter().take(1).collect(),
        ToolCallPolicy::All => calls,
    }
}

/// Returns the text fed back to the model as this call's tool result.
async fn execute_tool_call(
    call: &PendingToolCall,
    tools: &dyn ToolExecutor,
    cancel_token: &CancellationToken,
    session_id: &str,
) -> Result<String, AgentError> {
    let args = match parse_tool_args(&call.arguments) {
        Ok(args) => args,
        Err(error) => {
            let error = AgentError::InvalidArguments {
                tool_name: call.name.clone(),
                message: error.reason().to_string(),
            };
            log::warn!("[{}] {}", session_id, error);
            return Ok(format!("Tool failed: {}", error));
        }
    };

    log::info!("[{}] Executing tool '{}'", session_id, call.name);
    let timer = Timer::new(format!("tool_{}", call.name));

    let result = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => return Err(AgentError::Cancelled),
        result = dispatch_tool_call(tools, &call.name, args) => result,
    };

    timer.debug(session_id);
    Ok(result)
}

async fn emit_rate_limit_notice(emitter: &FrameEmitter, message: &str) -> Result<(), AgentError> {
    let message = message.trim();
    let message = if message.is_empty() {
        DEFAULT_RATE_LIMIT_NOTICE
    } else {
        message
    };
    emitter.chunk(format!("\n⚠️ {message}")).await
}

struct DebugLogger {
    enabled: bool,
}

impl DebugLogger {
    fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn log_event(&self, session_id: &str, event_type: &str, details: serde_json::Value) {
        if !self.enabled {
            return;
        }

        log::debug!("[{}] {}: {}", session_id, event_type, details);
    }
}

struct Timer {
    name: String,
    start: std::time::Instant,
}

impl Timer {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: std::time::Instant::now(),
        }
    }

    fn debug(&self, session_id: &str) {
        log::debug!(
            "[{}] {} completed in {}ms",
            session_id,
            self.name,
            self.start.elapsed().as_millis()
        );
    }
}
