use thiserror::Error;

/// Failures talking to a remote inference service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteServiceError {
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Credentials rejected (401/403) or missing
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited{}", .retry_after_secs.map(|s| format!(", retry after {}s", s)).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// The service answered but the body was not a usable completion
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Connection-level failure before any HTTP status was received
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Service not configured: {0}")]
    NotConfigured(String),
}

impl RemoteServiceError {
    /// Maps a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> Self {
        let message = error_message(body);
        match status {
            401 | 403 => RemoteServiceError::Auth(message),
            429 => RemoteServiceError::RateLimited { retry_after_secs },
            _ => RemoteServiceError::Status { status, message },
        }
    }
}

const MAX_MESSAGE_LEN: usize = 200;

// OpenAI-style bodies carry {"error": {"message": ...}}; anything else is truncated raw text
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.pointer("/error/message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        let cut: String = trimmed.chars().take(MAX_MESSAGE_LEN).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}
