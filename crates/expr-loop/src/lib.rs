pub mod config;
pub mod emitter;
pub mod exchange;
pub mod runner;
pub mod stream;

pub use config::{AgentLoopConfig, ToolCallPolicy, DEFAULT_SYSTEM_PROMPT};
pub use emitter::FrameEmitter;
pub use exchange::{run_exchange, ExchangeReport, ExchangeRequest, ExchangeStatus, HistoryEntry};
pub use runner::{run_agent_loop, LoopOutcome};
