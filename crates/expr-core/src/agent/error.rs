use thiserror::Error;

/// Every way an exchange can leave the happy path.
///
/// The exchange boundary matches on this exhaustively, so adding a variant
/// forces a decision about what the caller sees.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("{0}")]
    Precondition(String),

    #[error("{message}")]
    RateLimited { message: String },

    #[error("Tool '{tool_name}' failed: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool call at index {index} has no tool name")]
    MalformedToolCall { index: u32 },

    #[error("Invalid arguments for '{tool_name}': {message}")]
    InvalidArguments { tool_name: String, message: String },

    #[error("Exceeded maximum of {0} model turns")]
    MaxTurnsExceeded(usize),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Unrecoverable(String),
}

impl AgentError {
    /// Errors the loop folds back into the conversation instead of failing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::ToolExecution { .. } | AgentError::InvalidArguments { .. }
        )
    }
}
