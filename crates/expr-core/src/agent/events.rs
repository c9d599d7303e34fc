use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StreamStatus {
    #[serde(rename = "STREAMING_END")]
    StreamingEnd,
}

/// A typed unit sent to the caller. Serialized as the SSE `data` payload,
/// with [`OutboundFrame::event_name`] as the SSE `event` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OutboundFrame {
    Chunk { text: String },
    Status { status: StreamStatus },
    Error { error: String },
}

impl OutboundFrame {
    pub fn chunk(text: impl Into<String>) -> Self {
        OutboundFrame::Chunk { text: text.into() }
    }

    pub fn streaming_end() -> Self {
        OutboundFrame::Status {
            status: StreamStatus::StreamingEnd,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        OutboundFrame::Error {
            error: error.into(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundFrame::Chunk { .. } => "chunk",
            OutboundFrame::Status { .. } => "status",
            OutboundFrame::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutboundFrame::Chunk { .. })
    }
}
