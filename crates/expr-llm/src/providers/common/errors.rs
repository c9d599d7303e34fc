//! Mapping of provider error payloads onto [`LLMError`].

use serde::Deserialize;

use crate::provider::LLMError;

const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
}

impl ErrorBody {
    fn is_rate_limit(&self) -> bool {
        let code_matches = self
            .code
            .as_ref()
            .and_then(|code| code.as_str())
            .is_some_and(|code| code == RATE_LIMIT_CODE);
        code_matches || self.error_type.as_deref() == Some("rate_limit_error")
    }
}

/// Classify a non-success HTTP response.
pub fn classify_error_response(status: u16, body: &str) -> LLMError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .ok();

    if status == 429 || parsed.as_ref().is_some_and(ErrorBody::is_rate_limit) {
        let message = parsed.and_then(|error| error.message).unwrap_or_default();
        return LLMError::RateLimited { message };
    }

    let detail = parsed
        .and_then(|error| error.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => LLMError::Auth(format!("HTTP {}: {}", status, detail)),
        _ => LLMError::Api(format!("HTTP {}: {}", status, detail)),
    }
}

/// Classify an `{"error": ...}` object delivered inside an open stream.
pub(crate) fn classify_stream_error(error: ErrorBody) -> LLMError {
    if error.is_rate_limit() {
        return LLMError::RateLimited {
            message: error.message.unwrap_or_default(),
        };
    }
    LLMError::Api(
        error
            .message
            .unwrap_or_else(|| "provider reported an error".to_string()),
    )
}
