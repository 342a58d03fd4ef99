//! Turn-based debate orchestration
//!
//! A [`DebateManager`] owns one debate session: the roster, the message log,
//! and the state machine that lets exactly one agent speak at a time.

mod context;
mod manager;
mod sanitize;
mod types;

pub use context::{build_context, topic_prompt};
pub use manager::{DebateManager, TurnHandle, TURN_EVENT_CAPACITY};
pub use sanitize::clean_message_content;
pub use types::{
    DebateMessage, DebateMode, DebateStatus, StreamKind, StreamMessage, SYSTEM_AGENT_ID,
};
