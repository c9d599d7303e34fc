use async_trait::async_trait;
use expr_core::{ToolError, ToolExecutor, ToolResult, ToolSchema};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::McpServerConfig;
use crate::error::{McpError, Result};
use crate::protocol::{McpProtocolClient, McpTransport};
use crate::transports::StreamableHttpTransport;

/// Tool executor backed by one MCP session.
///
/// The session is opened on first use and lives until [`ToolExecutor::close`].
pub struct McpToolExecutor {
    config: McpServerConfig,
    transport: Mutex<Option<Box<dyn McpTransport>>>,
    client: OnceCell<McpProtocolClient>,
}

impl McpToolExecutor {
    pub fn new(config: McpServerConfig) -> Self {
        let transport = Box::new(StreamableHttpTransport::new(config.clone()));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: McpServerConfig, transport: Box<dyn McpTransport>) -> Self {
        Self {
            config,
            transport: Mutex::new(Some(transport)),
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&McpProtocolClient> {
        self.client
            .get_or_try_init(|| async {
                let transport = self
                    .transport
                    .lock()
                    .map_err(|_| McpError::Connection("transport lock poisoned".to_string()))?
                    .take()
                    .ok_or(McpError::Disconnected)?;

                let client = McpProtocolClient::new(
                    transport,
                    Duration::from_millis(self.config.request_timeout_ms),
                );
                client.connect().await?;
                client.initialize().await?;
                Ok(client)
            })
            .await
    }
}

#[async_trait]
impl ToolExecutor for McpToolExecutor {
    async fn list_tools(&self) -> std::result::Result<Vec<ToolSchema>, ToolError> {
        let client = self.client().await?;
        let tools = client.list_tools().await?;

        let schemas: Vec<ToolSchema> = tools
            .into_iter()
            .filter(|tool| self.config.is_tool_allowed(&tool.name))
            .map(|tool| ToolSchema::function(tool.name, tool.description, tool.parameters))
            .collect();

        debug!("MCP catalog: {} tools", schemas.len());
        Ok(schemas)
    }

    async fn execute(&self, name: &str, args: Value) -> std::result::Result<ToolResult, ToolError> {
        if !self.config.is_tool_allowed(name) {
            return Err(ToolError::NotFound(name.to_string()));
        }

        let client = self.client().await?;
        debug!("Executing MCP tool: {}", name);

        let result = client.call_tool(name, args).await.map_err(|e| {
            warn!("MCP tool '{}' failed: {}", name, e);
            ToolError::from(e)
        })?;

        Ok(ToolResult {
            success: !result.is_error,
            result: result.text(),
        })
    }

    async fn close(&self) {
        let Some(client) = self.client.get() else {
            return;
        };
        if let Err(e) = client.disconnect().await {
            warn!("MCP disconnect failed: {}", e);
        }
    }
}
