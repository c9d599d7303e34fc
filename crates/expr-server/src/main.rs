use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use expr_llm::providers::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use expr_loop::ToolCallPolicy;
use expr_mcp::config::DEFAULT_MCP_URL;
use expr_server::logging::init_logging;
use expr_server::{run_server, ServerConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "expr-server")]
#[command(about = "Riot assistant chat server with MCP tools and session memory")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "LLM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    llm_base_url: String,

    /// LLM model name
    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// LLM API key
    #[arg(long, env = "LLM_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Connect and completion timeout for the LLM, in seconds
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value = "30")]
    llm_timeout_secs: u64,

    /// MCP streamable HTTP endpoint
    #[arg(long, env = "MCP_SERVER_URL", default_value = DEFAULT_MCP_URL)]
    mcp_server_url: String,

    /// Directory for session summaries, the audit log and mcp.json
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Model turns allowed per request
    #[arg(long, env = "MAX_TURNS", default_value = "8")]
    max_turns: usize,

    /// Tool calls executed per turn: `first` or `all`
    #[arg(long, env = "TOOL_CALL_POLICY", default_value = "first")]
    tool_call_policy: ToolCallPolicy,

    /// Longest silence tolerated inside a model stream, in seconds
    #[arg(long, env = "STREAM_IDLE_TIMEOUT_SECS", default_value = "60")]
    stream_idle_timeout_secs: u64,
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug);

    log::info!("Starting expr-server on port {}", cli.port);
    log::info!("LLM Configuration:");
    log::info!("  Base URL: {}", cli.llm_base_url);
    log::info!("  Model: {}", cli.model);
    log::info!("  Max turns: {}", cli.max_turns);
    log::info!("  Tool call policy: {:?}", cli.tool_call_policy);

    run_server(ServerConfig {
        port: cli.port,
        llm_base_url: cli.llm_base_url,
        llm_model: cli.model,
        llm_api_key: cli.api_key,
        llm_timeout: Duration::from_secs(cli.llm_timeout_secs),
        mcp_server_url: cli.mcp_server_url,
        data_dir: cli.data_dir,
        max_turns: cli.max_turns,
        tool_call_policy: cli.tool_call_policy,
        stream_idle_timeout: Duration::from_secs(cli.stream_idle_timeout_secs),
    })
    .await
}
