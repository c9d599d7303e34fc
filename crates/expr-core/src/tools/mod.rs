pub mod accumulator;
pub mod executor;
pub mod types;

pub use accumulator::{DeltaAccumulator, PendingToolCall, StreamDelta, ToolCallDelta};
pub use executor::{dispatch_tool_call, parse_tool_args, ToolError, ToolExecutor};
pub use types::{FunctionCall, FunctionSchema, ToolCall, ToolResult, ToolSchema};
