//! OpenAI-compatible wire types for the gateway

use crate::llm::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One message as it appears in an OpenAI-style request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl From<&WireMessage> for ChatMessage {
    fn from(msg: &WireMessage) -> Self {
        let role = match msg.role.as_str() {
            "developer" => Role::System,
            other => other.parse().unwrap_or(Role::User),
        };
        ChatMessage::new(role, msg.content.clone())
    }
}

/// `POST /v1/chat/completions` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub messages: Vec<WireMessage>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub temperature: Option<f64>,

    /// Non-standard: selects the upstream; falls back to the default provider
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    /// Rough estimate; upstream usage is not collected
    pub fn estimate(message_count: usize, completion: &str) -> Self {
        let prompt_tokens = message_count * 10;
        let completion_tokens = completion.len() / 4;
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<WireMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,

    pub finish_reason: Option<String>,
}

/// Streaming delta; an empty delta closes the stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Non-streaming completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// One `chat.completion.chunk` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
}

impl CompletionChunk {
    pub fn content(id: &str, created: i64, model: &str, text: impl Into<String>) -> Self {
        Self::with_choice(
            id,
            created,
            model,
            Choice {
                index: 0,
                message: None,
                delta: Some(Delta {
                    role: None,
                    content: Some(text.into()),
                }),
                finish_reason: None,
            },
        )
    }

    pub fn stop(id: &str, created: i64, model: &str) -> Self {
        Self::with_choice(
            id,
            created,
            model,
            Choice {
                index: 0,
                message: None,
                delta: Some(Delta::default()),
                finish_reason: Some("stop".to_string()),
            },
        )
    }

    fn with_choice(id: &str, created: i64, model: &str, choice: Choice) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![choice],
        }
    }
}

/// Gateway settings exposed over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub default_provider: String,

    #[serde(default = "default_logging")]
    pub enable_logging: bool,
}

fn default_logging() -> bool {
    true
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            default_provider: "openai".to_string(),
            enable_logging: true,
        }
    }
}

/// Entry of the static `/v1/models` catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub object: &'static str,
    pub owned_by: &'static str,
    pub provider: &'static str,
}

const fn model(id: &'static str, owned_by: &'static str, provider: &'static str) -> ModelInfo {
    ModelInfo {
        id,
        object: "model",
        owned_by,
        provider,
    }
}

/// Models advertised by the gateway. Not fetched from upstreams.
pub const MODEL_CATALOG: &[ModelInfo] = &[
    model("gpt-4", "openai", "openai"),
    model("gpt-3.5-turbo", "openai", "openai"),
    model("claude-3-5-sonnet-20241022", "anthropic", "anthropic"),
    model("claude-3-opus-20240229", "anthropic", "anthropic"),
    model("gemini-pro", "google", "gemini"),
    model("gemini-1.5-pro", "google", "gemini"),
    model("llama2", "ollama", "ollama"),
    model("mistral", "ollama", "ollama"),
];

/// Gateway failure, rendered as `{"error":{"message","type"}}`
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub status: u16,
    pub kind: &'static str,
    pub message: String,
}

impl GatewayError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            kind: "invalid_request_error",
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self {
            status: 401,
            kind: "authentication_error",
            message: message.into(),
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            kind: "api_error",
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            kind: "server_error",
            message: message.into(),
        }
    }

    pub fn body(&self) -> serde_json::Value {
        error_body(&self.message, self.kind)
    }
}

pub(crate) fn error_body(message: &str, kind: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": kind
        }
    })
}
