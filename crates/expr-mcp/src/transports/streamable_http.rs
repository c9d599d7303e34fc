use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{HeaderConfig, McpServerConfig};
use crate::error::{McpError, Result};
use crate::protocol::client::McpTransport;

const SESSION_HEADER: &str = "mcp-session-id";

/// Streamable HTTP transport: each JSON-RPC message is a POST to one
/// endpoint, answered with either a JSON body or a short SSE stream.
pub struct StreamableHttpTransport {
    config: McpServerConfig,
    client: Client,
    connected: AtomicBool,
    session_id: Mutex<Option<String>>,
}

impl StreamableHttpTransport {
    pub fn new(config: McpServerConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            config,
            client,
            connected: AtomicBool::new(false),
            session_id: Mutex::new(None),
        }
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for HeaderConfig { name, value } in &self.config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| McpError::InvalidConfig(format!("Invalid header name: {}", e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| McpError::InvalidConfig(format!("Invalid header value: {}", e)))?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }

    async fn with_session(&self, mut headers: HeaderMap) -> HeaderMap {
        if let Some(id) = self.session_id.lock().await.as_deref() {
            if let Ok(value) = HeaderValue::from_str(id) {
                headers.insert(HeaderName::from_static(SESSION_HEADER), value);
            }
        }
        headers
    }

    async fn remember_session(&self, response: &Response) {
        let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return;
        };

        let mut session = self.session_id.lock().await;
        if session.as_deref() != Some(id) {
            debug!("MCP session id assigned: {}", id);
            *session = Some(id.to_string());
        }
    }

    /// Reads SSE `message` events until a JSON-RPC response arrives or the stream ends.
    async fn read_event_stream(response: Response) -> Result<Vec<String>> {
        let mut messages = Vec::new();
        let mut stream = response.bytes_stream().eventsource();

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| McpError::Transport(e.to_string()))?;
            if !(event.event.is_empty() || event.event == "message") || event.data.is_empty() {
                continue;
            }

            let is_response = serde_json::from_str::<Value>(&event.data)
                .map(|value| value.get("id").is_some() && value.get("method").is_none())
                .unwrap_or(false);
            messages.push(event.data);
            if is_response {
                break;
            }
        }

        Ok(messages)
    }

    async fn read_json_body(response: Response) -> Result<Vec<String>> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&text)? {
            Value::Array(batch) => Ok(batch.iter().map(Value::to_string).collect()),
            _ => Ok(vec![text]),
        }
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn connect(&self) -> Result<()> {
        // Validates configured headers up front; the session itself starts with `initialize`.
        self.build_headers()?;
        self.connected.store(true, Ordering::SeqCst);
        info!("MCP streamable HTTP transport ready: {}", self.config.url);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let Some(session_id) = self.session_id.lock().await.take() else {
            return Ok(());
        };

        let headers = self.build_headers()?;
        let result = self
            .client
            .delete(&self.config.url)
            .headers(headers)
            .header(SESSION_HEADER, session_id.as_str())
            .timeout(Duration::from_millis(self.config.connect_timeout_ms))
            .send()
            .await;

        match result {
            Ok(response) => debug!("MCP session {} closed ({})", session_id, response.status()),
            Err(e) => debug!("MCP session {} close failed: {}", session_id, e),
        }
        Ok(())
    }

    async fn send(&self, message: String) -> Result<Vec<String>> {
        if !self.is_connected() {
            return Err(McpError::Disconnected);
        }

        let headers = self.with_session(self.build_headers()?).await;
        let response = self
            .client
            .post(&self.config.url)
            .headers(headers)
            .body(message)
            .send()
            .await?;

        self.remember_session(&response).await;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!("HTTP {}: {}", status, body)));
        }

        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(Vec::new());
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));

        if is_event_stream {
            Self::read_event_stream(response).await
        } else {
            Self::read_json_body(response).await
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
