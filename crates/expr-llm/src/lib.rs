pub mod provider;
pub mod providers;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use provider::{LLMError, LLMProvider, LLMStream};
pub use providers::OpenAIProvider;
pub use types::LLMChunk;
