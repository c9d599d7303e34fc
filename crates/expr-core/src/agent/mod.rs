pub mod error;
pub mod events;
pub mod types;

pub use error::AgentError;
pub use events::{OutboundFrame, StreamStatus};
pub use types::{Message, Role};
