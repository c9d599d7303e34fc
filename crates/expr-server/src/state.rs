use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use expr_core::{OutboundFrame, ToolExecutor};
use expr_llm::{LLMProvider, OpenAIProvider};
use expr_loop::{AgentLoopConfig, ToolCallPolicy};
use expr_mcp::{McpServerConfig, McpToolExecutor};
use expr_memory::{
    AuditLog, JsonFileSummaryStore, LlmSummarizer, MemoryConfig, SessionMemoryManager,
    SqliteAuditLog,
};

/// Builds a fresh tool session for one request.
pub type ToolsFactory = Arc<dyn Fn() -> Box<dyn ToolExecutor> + Send + Sync>;

/// Everything the binary reads from the command line and environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: String,
    pub llm_timeout: Duration,
    pub mcp_server_url: String,
    /// Defaults to `~/.expr-server`.
    pub data_dir: Option<PathBuf>,
    pub max_turns: usize,
    pub tool_call_policy: ToolCallPolicy,
    pub stream_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let loop_config = AgentLoopConfig::default();
        Self {
            port: 8080,
            llm_base_url: expr_llm::providers::openai::DEFAULT_BASE_URL.to_string(),
            llm_model: expr_llm::providers::openai::DEFAULT_MODEL.to_string(),
            llm_api_key: String::new(),
            llm_timeout: Duration::from_secs(30),
            mcp_server_url: expr_mcp::config::DEFAULT_MCP_URL.to_string(),
            data_dir: None,
            max_turns: loop_config.max_turns,
            tool_call_policy: loop_config.tool_call_policy,
            stream_idle_timeout: loop_config.stream_idle_timeout,
        }
    }
}

impl ServerConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn loop_config(&self) -> AgentLoopConfig {
        AgentLoopConfig {
            max_turns: self.max_turns,
            tool_call_policy: self.tool_call_policy,
            stream_idle_timeout: self.stream_idle_timeout,
            ..Default::default()
        }
    }
}

pub struct AppState {
    pub llm: Arc<dyn LLMProvider>,
    pub tools_factory: ToolsFactory,
    pub memory: Arc<SessionMemoryManager>,
    pub loop_config: AgentLoopConfig,
}

impl AppState {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        tools_factory: ToolsFactory,
        memory: Arc<SessionMemoryManager>,
        loop_config: AgentLoopConfig,
    ) -> Self {
        Self {
            llm,
            tools_factory,
            memory,
            loop_config,
        }
    }

    /// Wires the provider, tool server and memory stores from `config`.
    pub async fn from_config(config: &ServerConfig) -> io::Result<Self> {
        let data_dir = config.resolved_data_dir();
        log::info!("Using data directory: {:?}", data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;

        log::info!(
            "Creating LLM provider with base URL: {} and model: {}",
            config.llm_base_url,
            config.llm_model
        );
        if config.llm_api_key.is_empty() {
            log::warn!("LLM_API_KEY is empty; provider requests will likely be rejected");
        }
        let llm: Arc<dyn LLMProvider> = Arc::new(
            OpenAIProvider::new(config.llm_api_key.clone())
                .with_base_url(config.llm_base_url.clone())
                .with_model(config.llm_model.clone())
                .with_connect_timeout(config.llm_timeout)
                .with_request_timeout(config.llm_timeout),
        );

        let mcp_config = load_mcp_config(&data_dir, &config.mcp_server_url).await;
        log::info!("MCP tool server: {}", mcp_config.url);
        let tools_factory: ToolsFactory = Arc::new(move || {
            Box::new(McpToolExecutor::new(mcp_config.clone())) as Box<dyn ToolExecutor>
        });

        let store = JsonFileSummaryStore::new(data_dir.join("sessions"));
        store.init().await?;
        let audit = SqliteAuditLog::new(data_dir.join("audit.db"));
        audit
            .init()
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let memory = Arc::new(SessionMemoryManager::new(
            Arc::new(store),
            Arc::new(audit),
            Arc::new(LlmSummarizer::new(llm.clone())),
            MemoryConfig::default(),
        ));

        Ok(Self::new(llm, tools_factory, memory, config.loop_config()))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".expr-server")
}

/// `{data_dir}/mcp.json` overrides the tool server settings when present.
pub async fn load_mcp_config(data_dir: &Path, fallback_url: &str) -> McpServerConfig {
    let config_path = data_dir.join("mcp.json");
    let fallback = McpServerConfig::from_url(fallback_url);

    if !config_path.exists() {
        log::info!("No MCP config file found at {:?}, using {}", config_path, fallback_url);
        return fallback;
    }

    match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => match serde_json::from_str::<McpServerConfig>(&content) {
            Ok(config) => {
                log::info!("Loaded MCP config from {:?}", config_path);
                config
            }
            Err(e) => {
                log::error!("Failed to parse MCP config: {}", e);
                fallback
            }
        },
        Err(e) => {
            log::error!("Failed to read MCP config: {}", e);
            fallback
        }
    }
}

/// Encodes one frame as a named SSE message.
pub fn sse_message(frame: &OutboundFrame) -> Option<Bytes> {
    let data = serde_json::to_string(frame).ok()?;
    Some(Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        frame.event_name(),
        data
    )))
}

/// Forwards frames to the response body until the exchange drops its
/// emitter. If the body goes away first, the request is cancelled.
pub fn spawn_sse_sender(
    mut rx: mpsc::Receiver<OutboundFrame>,
    tx: mpsc::Sender<Bytes>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = rx.recv() => frame,
                _ = tx.closed() => {
                    cancel_token.cancel();
                    break;
                }
            };

            let Some(frame) = frame else {
                break;
            };
            let Some(bytes) = sse_message(&frame) else {
                continue;
            };

            if tx.send(bytes).await.is_err() {
                cancel_token.cancel();
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_message_uses_named_events() {
        let bytes = sse_message(&OutboundFrame::chunk("hi")).unwrap();
        assert_eq!(bytes, Bytes::from("event: chunk\ndata: {\"text\":\"hi\"}\n\n"));

        let bytes = sse_message(&OutboundFrame::streaming_end()).unwrap();
        assert_eq!(
            bytes,
            Bytes::from("event: status\ndata: {\"status\":\"STREAMING_END\"}\n\n")
        );
    }

    #[tokio::test]
    async fn load_mcp_config_prefers_file() {
        let dir = tempfile::tempdir().unwrap();

        let config = load_mcp_config(dir.path(), "http://fallback/mcp").await;
        assert_eq!(config.url, "http://fallback/mcp");

        tokio::fs::write(
            dir.path().join("mcp.json"),
            r#"{"url": "http://riot-tools:9000/mcp", "denied_tools": ["admin"]}"#,
        )
        .await
        .unwrap();
        let config = load_mcp_config(dir.path(), "http://fallback/mcp").await;
        assert_eq!(config.url, "http://riot-tools:9000/mcp");
        assert!(!config.is_tool_allowed("admin"));
        assert_eq!(config.request_timeout_ms, 30000);

        tokio::fs::write(dir.path().join("mcp.json"), "{ nope").await.unwrap();
        let config = load_mcp_config(dir.path(), "http://fallback/mcp").await;
        assert_eq!(config.url, "http://fallback/mcp");
    }

    #[tokio::test]
    async fn sse_sender_cancels_when_body_dropped() {
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let (body_tx, body_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = spawn_sse_sender(frame_rx, body_tx, cancel.clone());

        drop(body_rx);
        handle.await.unwrap();

        assert!(cancel.is_cancelled());
        assert!(frame_tx.send(OutboundFrame::chunk("late")).await.is_err());
    }

    #[tokio::test]
    async fn from_config_creates_stores() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            data_dir: Some(dir.path().join("data")),
            max_turns: 3,
            ..Default::default()
        };

        let state = AppState::from_config(&config).await.unwrap();

        assert_eq!(state.loop_config.max_turns, 3);
        assert!(dir.path().join("data/sessions").is_dir());
        assert!(dir.path().join("data/audit.db").exists());
        assert_eq!(state.memory.lookup("nobody").await, "");
    }
}
