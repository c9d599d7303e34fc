use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a Riot/League of Legends assistant. Only answer \
questions about Riot games, League of Legends data, matches, champions, runes, items, and related \
esports. If the user asks anything unrelated, politely refuse and ask them to stay on Riot topics. \
Keep answers concise.";

/// Which of the tool calls requested in one model turn are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolCallPolicy {
    /// Only the lowest-index call; the rest are dropped.
    #[default]
    FirstOnly,
    /// Every call, in index order, before the next model turn.
    All,
}

impl FromStr for ToolCallPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first-only" | "first_only" => Ok(ToolCallPolicy::FirstOnly),
            "all" => Ok(ToolCallPolicy::All),
            other => Err(format!("unknown tool call policy '{other}' (expected 'first' or 'all')")),
        }
    }
}

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    /// Model calls allowed per exchange.
    pub max_turns: usize,
    pub tool_call_policy: ToolCallPolicy,
    /// Longest gap tolerated between two fragments of a model stream.
    pub stream_idle_timeout: Duration,
    pub system_prompt: String,
    /// Caller-supplied history entries kept, newest last.
    pub max_history_messages: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_turns: 8,
            tool_call_policy: ToolCallPolicy::FirstOnly,
            stream_idle_timeout: Duration::from_secs(60),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_history_messages: 12,
        }
    }
}
