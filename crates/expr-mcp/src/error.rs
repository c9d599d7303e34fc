use expr_core::ToolError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Server disconnected")]
    Disconnected,
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        McpError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for McpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            McpError::Timeout(e.to_string())
        } else if e.is_connect() {
            McpError::Connection(e.to_string())
        } else {
            McpError::Transport(e.to_string())
        }
    }
}

impl From<McpError> for ToolError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::ToolNotFound(name) => ToolError::NotFound(name),
            McpError::Transport(_)
            | McpError::Connection(_)
            | McpError::Timeout(_)
            | McpError::Disconnected
            | McpError::InvalidConfig(_) => ToolError::Unavailable(e.to_string()),
            McpError::Protocol(_) | McpError::Serialization(_) => {
                ToolError::Execution(e.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, McpError>;
