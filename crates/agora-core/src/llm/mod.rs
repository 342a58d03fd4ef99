//! LLM integration module
//!
//! Normalizes several streaming chat protocols into one event shape.
//!
//! Supported wire families:
//! - OpenAI-compatible SSE (OpenAI, Grok, DeepSeek, Perplexity)
//! - Anthropic Messages SSE
//! - Gemini `streamGenerateContent` SSE
//! - Ollama NDJSON (local inference)

mod anthropic;
mod error;
mod gemini;
mod message;
mod ollama;
mod openai;
mod options;
mod registry;
mod stream;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use error::LlmError;
pub use message::{ChatMessage, Role};
pub use options::{default_max_tokens, ChatOptions};
pub use registry::{create_provider, AuthStyle, ProviderConfig, ProviderKind};
pub use stream::{LineBuffer, LlmEvent, LlmStream, STREAM_CAPACITY};

pub(crate) use anthropic::ANTHROPIC_VERSION;
pub(crate) use message::split_system;
pub(crate) use registry::http_client;
pub(crate) use stream::{error_message, spawn_stream, Finish, FrameDecoder, Framing};

// Provider implementations
pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// LLM provider trait
///
/// Implementations are stateless per call: all connection settings are fixed
/// at construction time.
pub trait LlmProvider: Send + Sync {
    /// Provider kind identifier (e.g. "openai", "anthropic")
    fn id(&self) -> &str;

    /// Display name (e.g. "OpenAI", "Anthropic")
    fn name(&self) -> &str;

    /// Model this provider sends requests for
    fn model(&self) -> String;

    /// Start a streaming chat call.
    ///
    /// The network request runs on its own task. The returned receiver yields
    /// zero or more [`LlmEvent::Chunk`]s followed by exactly one terminal
    /// event. Firing `cancel` aborts the request and yields
    /// [`LlmEvent::Cancelled`]; dropping the receiver stops the task.
    fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> LlmStream;
}

/// Shared provider handle
pub type SharedProvider = Arc<dyn LlmProvider>;
