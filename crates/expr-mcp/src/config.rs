use serde::{Deserialize, Serialize};

pub const DEFAULT_MCP_URL: &str = "http://localhost:8000/mcp";

/// Connection settings for the remote tool server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpServerConfig {
    /// Streamable HTTP endpoint, e.g. `http://localhost:8000/mcp`
    pub url: String,
    /// Additional headers sent with every request
    #[serde(default)]
    pub headers: Vec<HeaderConfig>,
    /// Per JSON-RPC request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Tools exposed to the model (empty = all)
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub denied_tools: Vec<String>,
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_connect_timeout() -> u64 {
    10000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeaderConfig {
    pub name: String,
    pub value: String,
}

impl McpServerConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
        }
    }

    pub fn is_tool_allowed(&self, name: &str) -> bool {
        if self.denied_tools.iter().any(|denied| denied == name) {
            return false;
        }
        self.allowed_tools.is_empty() || self.allowed_tools.iter().any(|allowed| allowed == name)
    }
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self::from_url(DEFAULT_MCP_URL)
    }
}
