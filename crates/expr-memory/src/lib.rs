//! Compressed long-term context for chat sessions.
//!
//! After each finished exchange the conversation is summarized and the
//! summary is kept in three layers: an in-process cache, a durable
//! key/value store, and an append-only audit log of the exchanged messages.

pub mod audit;
pub mod cache;
pub mod error;
pub mod manager;
pub mod store;
pub mod summarizer;
pub mod types;

pub use audit::{AuditLog, SqliteAuditLog};
pub use cache::SessionCache;
pub use error::{MemoryError, MemoryResult};
pub use manager::{MemoryConfig, SessionMemoryManager};
pub use store::{JsonFileSummaryStore, SummaryStore};
pub use summarizer::{clip_summary, LlmSummarizer, SummaryInput, Summarizer};
pub use types::{AuditEntry, SessionRecord};
