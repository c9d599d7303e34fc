use serde::{Deserialize, Serialize};

use crate::protocol::McpContentItem;

/// MCP tool metadata from server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Result of calling an MCP tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpCallResult {
    pub content: Vec<McpContentItem>,
    #[serde(default)]
    pub is_error: bool,
}

impl McpCallResult {
    /// Text items joined by newlines; other kinds are dropped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                McpContentItem::Text { text } => Some(text.as_str()),
                McpContentItem::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
