//! LLM error types

use std::fmt;

/// Error type for LLM operations
///
/// Caller-initiated cancellation is not an error; adapters report it as
/// [`super::LlmEvent::Cancelled`].
#[derive(Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Network/connection error
    Connection(String),

    /// Authentication rejected by the upstream (401/403)
    Auth { status: u16, message: String },

    /// Any other non-2xx upstream response
    Api { status: u16, message: String },

    /// Stream broke after the response started, or carried an error payload
    Stream(String),

    /// Invalid request (bad parameters)
    InvalidRequest(String),

    /// Provider kind is not known to the factory
    UnknownProvider(String),

    /// Internal error
    Internal(String),
}

impl LlmError {
    /// Classify a non-2xx status and its body
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        if status == 401 || status == 403 {
            LlmError::Auth { status, message }
        } else {
            LlmError::Api { status, message }
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Auth { status, .. } | LlmError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Connection(msg) => write!(f, "Connection error: {}", msg),
            LlmError::Auth { status, message } => {
                write!(f, "API error {}: {}", status, message)
            }
            LlmError::Api { status, message } => {
                write!(f, "API error {}: {}", status, message)
            }
            LlmError::Stream(msg) => write!(f, "Stream error: {}", msg),
            LlmError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            LlmError::UnknownProvider(kind) => write!(f, "unsupported provider: {}", kind),
            LlmError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            LlmError::from_status(status.as_u16(), err.to_string())
        } else if err.is_timeout() {
            LlmError::Connection(format!("timeout: {}", err))
        } else if err.is_body() || err.is_decode() {
            LlmError::Stream(err.to_string())
        } else {
            LlmError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Internal(format!("JSON error: {}", err))
    }
}
