use expr_core::StreamDelta;

#[derive(Debug, Clone, PartialEq)]
pub enum LLMChunk {
    Delta(StreamDelta),
    Done,
}

impl LLMChunk {
    pub fn token(text: impl Into<String>) -> Self {
        LLMChunk::Delta(StreamDelta::text(text))
    }
}
