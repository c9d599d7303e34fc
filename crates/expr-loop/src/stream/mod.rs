pub mod handler;

pub use handler::{consume_llm_stream, StreamOutcome};
