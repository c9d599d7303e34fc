//! MCP (Model Context Protocol) client over the streamable HTTP transport.
//!
//! Exposes a remote tool server's catalog and `tools/call` through the
//! [`expr_core::ToolExecutor`] trait.

pub mod config;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod transports;
pub mod types;

pub use config::{HeaderConfig, McpServerConfig};
pub use error::{McpError, Result};
pub use executor::McpToolExecutor;
pub use protocol::{McpProtocolClient, McpTransport};
pub use transports::StreamableHttpTransport;
pub use types::{McpCallResult, McpTool};
