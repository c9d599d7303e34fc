use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{McpError, Result};
use crate::protocol::models::*;
use crate::types::{McpCallResult, McpTool};

/// Transport trait for MCP communication.
///
/// `send` delivers one JSON-RPC message and returns every message the server
/// wrote back in reply (none for notifications).
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn send(&self, message: String) -> Result<Vec<String>>;
    fn is_connected(&self) -> bool;
}

/// MCP protocol client
pub struct McpProtocolClient {
    transport: Box<dyn McpTransport>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl McpProtocolClient {
    pub fn new(transport: Box<dyn McpTransport>, request_timeout: Duration) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
            request_timeout,
        }
    }

    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.transport.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn match_response(id: u64, replies: Vec<String>) -> Result<JsonRpcResponse> {
        for message in replies {
            match serde_json::from_str::<JsonRpcResponse>(&message) {
                Ok(response) if response.id == id => return Ok(response),
                Ok(response) => debug!("Ignoring response for request {}", response.id),
                Err(_) => debug!("Ignoring non-response message: {}", message),
            }
        }
        Err(McpError::Protocol(format!("No response for request {}", id)))
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.transport.is_connected() {
            return Err(McpError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let request_json = serde_json::to_string(&request)?;

        debug!("MCP request {} {}", id, method);

        let replies = match tokio::time::timeout(
            self.request_timeout,
            self.transport.send(request_json),
        )
        .await
        {
            Ok(replies) => replies?,
            Err(_) => {
                warn!("MCP request {} ({}) timed out", id, method);
                return Err(McpError::Timeout(format!(
                    "Request {} timed out after {}ms",
                    id,
                    self.request_timeout.as_millis()
                )));
            }
        };

        let response = Self::match_response(id, replies)?;

        if let Some(error) = response.error {
            return Err(McpError::Protocol(format!("{}: {}", error.code, error.message)));
        }

        response
            .result
            .ok_or_else(|| McpError::Protocol("Missing result".to_string()))
    }

    async fn send_notification(&self, method: &str) -> Result<()> {
        let notification = JsonRpcNotification::new(method);
        let notification_json = serde_json::to_string(&notification)?;

        match tokio::time::timeout(self.request_timeout, self.transport.send(notification_json))
            .await
        {
            Ok(sent) => sent.map(|_| ()),
            Err(_) => {
                warn!("MCP notification {} timed out", method);
                Err(McpError::Timeout(format!(
                    "Notification {} timed out after {}ms",
                    method,
                    self.request_timeout.as_millis()
                )))
            }
        }
    }

    pub async fn initialize(&self) -> Result<McpInitializeResult> {
        let params = serde_json::to_value(McpInitializeRequest::default())?;
        let result = self.send_request("initialize", Some(params)).await?;
        let result: McpInitializeResult = serde_json::from_value(result)?;

        self.send_notification("notifications/initialized").await?;

        debug!(
            "MCP session initialized with {} {}",
            result.server_info.name, result.server_info.version
        );
        Ok(result)
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let result = self.send_request("tools/list", None).await?;
        let result: McpToolListResult = serde_json::from_value(result)?;

        Ok(result
            .tools
            .into_iter()
            .map(|t| McpTool {
                name: t.name,
                description: t.description.unwrap_or_default(),
                parameters: t
                    .input_schema
                    .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
            })
            .collect())
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpCallResult> {
        let request = McpToolCallRequest {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let params = serde_json::to_value(request)?;

        let result = self.send_request("tools/call", Some(params)).await?;
        let result: McpToolCallResult = serde_json::from_value(result)?;

        Ok(McpCallResult {
            content: result.content,
            is_error: result.is_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    /// Answers each request with the next scripted result, echoing its id.
    struct ScriptedTransport {
        connected: AtomicBool,
        results: Mutex<VecDeque<Value>>,
        sent: Mutex<Vec<Value>>,
        delay: Option<Duration>,
        notification_delay: Option<Duration>,
    }

    impl ScriptedTransport {
        fn new(results: Vec<Value>) -> Self {
            Self {
                connected: AtomicBool::new(false),
                results: Mutex::new(results.into()),
                sent: Mutex::new(Vec::new()),
                delay: None,
                notification_delay: None,
            }
        }
    }

    #[async_trait]
    impl McpTransport for ScriptedTransport {
        async fn connect(&self) -> Result<()> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, message: String) -> Result<Vec<String>> {
            let value: Value = serde_json::from_str(&message).unwrap();
            self.sent.lock().unwrap().push(value.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let Some(id) = value.get("id").cloned() else {
                if let Some(delay) = self.notification_delay {
                    tokio::time::sleep(delay).await;
                }
                return Ok(Vec::new());
            };
            let result = self.results.lock().unwrap().pop_front().unwrap();
            let noise = json!({"jsonrpc": "2.0", "method": "notifications/progress"});
            let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
            Ok(vec![noise.to_string(), reply.to_string()])
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn client(transport: ScriptedTransport) -> McpProtocolClient {
        McpProtocolClient::new(Box::new(transport), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn requests_fail_before_connect() {
        let client = client(ScriptedTransport::new(vec![]));
        assert!(matches!(client.list_tools().await, Err(McpError::Disconnected)));
    }

    #[tokio::test]
    async fn initialize_then_list_tools() {
        let client = client(ScriptedTransport::new(vec![
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "riot-tools", "version": "1.0"}
            }),
            json!({"tools": [{"name": "lookupChampion", "description": "Champion data"}]}),
        ]));
        client.connect().await.unwrap();

        let init = client.initialize().await.unwrap();
        assert_eq!(init.server_info.name, "riot-tools");

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "lookupChampion");
        assert_eq!(tools[0].parameters["type"], "object");
    }

    #[tokio::test]
    async fn call_tool_returns_text_content() {
        let client = client(ScriptedTransport::new(vec![json!({
            "content": [{"type": "text", "text": "Ahri"}, {"type": "text", "text": "Mage"}],
            "isError": false
        })]));
        client.connect().await.unwrap();

        let result = client
            .call_tool("lookupChampion", json!({"name": "Ahri"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "Ahri\nMage");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let mut transport = ScriptedTransport::new(vec![json!({"tools": []})]);
        transport.delay = Some(Duration::from_secs(5));
        let client = client(transport);
        client.connect().await.unwrap();

        assert!(matches!(client.list_tools().await, Err(McpError::Timeout(_))));
    }

    #[tokio::test]
    async fn stalled_initialized_notification_times_out() {
        let mut transport = ScriptedTransport::new(vec![json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "riot-tools", "version": "1.0"}
        })]);
        transport.notification_delay = Some(Duration::from_secs(5));
        let client = client(transport);
        client.connect().await.unwrap();

        let started = std::time::Instant::now();
        let result = client.initialize().await;

        assert!(matches!(
            result,
            Err(McpError::Timeout(message)) if message.contains("notifications/initialized")
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
