//! Error types for Agora Core
//!
//! Provides a unified error type for session and configuration operations.
//! Provider-level failures live in [`crate::llm::LlmError`].

use crate::llm::LlmError;
use thiserror::Error;

/// Result type for Agora Core operations
pub type Result<T> = std::result::Result<T, AgoraError>;

/// Unified error type for Agora Core
#[derive(Error, Debug)]
pub enum AgoraError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (unknown provider kind, unreadable file, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A debate is already running
    #[error("debate is already running")]
    AlreadyRunning,

    /// No debate is running
    #[error("debate is not running")]
    NotRunning,

    /// Another turn holds the session
    #[error("a turn is already in progress")]
    TurnInProgress,

    /// Agent id not present in the roster
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// Roster is empty
    #[error("no agents available")]
    NoAgents,

    /// Invalid argument supplied by the caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AgoraError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AgoraError::Config(msg.into())
    }

    /// Create an agent-not-found error
    pub fn agent_not_found(id: impl Into<String>) -> Self {
        AgoraError::AgentNotFound(id.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        AgoraError::InvalidRequest(msg.into())
    }

    /// Whether this error is a session-state conflict (retryable by the caller)
    pub fn is_conflict(&self) -> bool {
        matches!(self, AgoraError::AlreadyRunning | AgoraError::TurnInProgress)
    }
}

impl From<serde_json::Error> for AgoraError {
    fn from(err: serde_json::Error) -> Self {
        AgoraError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for AgoraError {
    fn from(err: toml::de::Error) -> Self {
        AgoraError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        assert!(AgoraError::AlreadyRunning.is_conflict());
        assert!(AgoraError::TurnInProgress.is_conflict());
        assert!(!AgoraError::NotRunning.is_conflict());
        assert!(!AgoraError::agent_not_found("x").is_conflict());
    }

    #[test]
    fn test_llm_error_wraps() {
        let err: AgoraError = LlmError::Connection("refused".into()).into();
        assert_eq!(err.to_string(), "LLM error: Connection error: refused");
    }
}
