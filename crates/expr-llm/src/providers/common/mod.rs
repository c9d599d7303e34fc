//! Shared helpers for provider implementations.

pub mod errors;
pub mod openai_compat;
pub mod sse;
