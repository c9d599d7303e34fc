use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tools::{ToolResult, ToolSchema};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool server unavailable: {0}")]
    Unavailable(String),
}

impl ToolError {
    /// The human-readable cause without the variant prefix.
    pub fn reason(&self) -> &str {
        match self {
            ToolError::NotFound(msg)
            | ToolError::Execution(msg)
            | ToolError::InvalidArguments(msg)
            | ToolError::Unavailable(msg) => msg,
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Executes named tools on behalf of the model.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The catalog advertised to the model for this request.
    async fn list_tools(&self) -> Result<Vec<ToolSchema>>;

    async fn execute(&self, name: &str, args: Value) -> Result<ToolResult>;

    /// Releases any per-request session. Called once when the exchange ends.
    async fn close(&self) {}
}

pub fn parse_tool_args(arguments: &str) -> Result<Value> {
    let args_raw = arguments.trim();

    if args_raw.is_empty() {
        return Ok(serde_json::json!({}));
    }

    serde_json::from_str(args_raw)
        .map_err(|error| ToolError::InvalidArguments(format!("Invalid JSON arguments: {error}")))
}

/// Runs one tool and folds every outcome into the text fed back to the model.
pub async fn dispatch_tool_call(tools: &dyn ToolExecutor, name: &str, args: Value) -> String {
    match tools.execute(name, args).await {
        Ok(result) if result.success => result.result,
        Ok(result) => {
            log::warn!("Tool '{}' reported failure: {}", name, result.result);
            format!("Tool failed: {}", result.result)
        }
        Err(error) => {
            log::warn!("Tool '{}' failed: {}", name, error);
            format!("Tool failed: {}", error.reason())
        }
    }
}
