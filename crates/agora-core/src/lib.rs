//! Agora Core - Backend library for Agora
//!
//! This crate provides the transport-agnostic backend:
//! - LLM providers (OpenAI family, Anthropic, Gemini, Ollama) behind one
//!   streaming event shape
//! - Debate agents and the turn-based debate state machine
//! - Broadcast hub fanning debate events out to live clients
//! - OpenAI-compatible completion gateway and raw pass-through proxy
//! - Configuration loading
//!
//! Any transport (HTTP, WebSocket, CLI) can drive it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  next_turn   ┌───────────────┐  chat()  ┌─────────────┐
//! │  Transport   │ ───────────→ │ DebateManager │ ───────→ │ LlmProvider │
//! │ (HTTP / WS)  │              └───────────────┘          └─────────────┘
//! │              │ ←── StreamMessage ───┘                        ▲
//! │              │         via BroadcastHub                      │
//! │              │ ──── /v1/chat/completions ──→ Gateway ────────┘
//! └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use agora_core::{build_roster, load_config, DebateManager};
//! use std::sync::Arc;
//!
//! let config = load_config(None)?;
//! let manager = Arc::new(DebateManager::new(build_roster(&config.resolved_agents())));
//!
//! manager.start("Should cities ban cars?")?;
//! let mut turn = manager.next_turn()?;
//! while let Some(event) = turn.events.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

pub mod agent;
pub mod config;
pub mod debate;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod llm;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{build_roster, default_agents, Agent, AgentConfig, AgentInfo};
pub use config::{load_config, resolve_config_path, AgoraConfig, ConfigError, ProviderSection};
pub use debate::{
    clean_message_content, DebateManager, DebateMessage, DebateMode, DebateStatus, StreamKind,
    StreamMessage, TurnHandle,
};
pub use error::{AgoraError, Result};
pub use gateway::{CompletionRequest, Gateway, GatewayError, GatewaySettings, RawResponse};
pub use hub::{BroadcastHub, Subscription};
pub use llm::{
    create_provider, ChatMessage, ChatOptions, LlmError, LlmEvent, LlmProvider, LlmStream,
    ProviderConfig, ProviderKind, SharedProvider,
};

/// Get the crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
