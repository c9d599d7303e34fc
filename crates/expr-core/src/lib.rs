pub mod agent;
pub mod tools;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use agent::events::{OutboundFrame, StreamStatus};
pub use agent::types::{Message, Role};
pub use agent::AgentError;
pub use tools::{
    dispatch_tool_call, parse_tool_args, DeltaAccumulator, FunctionCall, FunctionSchema,
    PendingToolCall, StreamDelta, ToolCall, ToolCallDelta, ToolError, ToolExecutor, ToolResult,
    ToolSchema,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
