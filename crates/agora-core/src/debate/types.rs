//! Debate session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Author id of synthetic separator messages
pub const SYSTEM_AGENT_ID: &str = "system";

/// Speaker selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateMode {
    /// Roster order, wrapping around
    #[default]
    RoundRobin,
    /// Anyone but the previous speaker
    FreeForm,
}

impl DebateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateMode::RoundRobin => "round_robin",
            DebateMode::FreeForm => "free_form",
        }
    }
}

impl fmt::Display for DebateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" => Ok(DebateMode::RoundRobin),
            "free_form" => Ok(DebateMode::FreeForm),
            other => Err(format!("invalid mode: {}", other)),
        }
    }
}

/// A finished, sanitized contribution to the debate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateMessage {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub color: String,
}

impl DebateMessage {
    /// Topic-change separators are authored by the system, not an agent
    pub fn is_system(&self) -> bool {
        self.agent_id == SYSTEM_AGENT_ID
    }
}

/// Kind of a [`StreamMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Start,
    Chunk,
    End,
    Error,
}

/// Turn event as sent to live clients.
///
/// Field names are a public wire contract; empty fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: StreamKind,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl StreamMessage {
    fn empty(kind: StreamKind) -> Self {
        Self {
            kind,
            agent_id: String::new(),
            agent_name: String::new(),
            content: String::new(),
            message_id: String::new(),
            color: String::new(),
            error: String::new(),
        }
    }

    pub fn start(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        color: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            color: color.into(),
            message_id: message_id.into(),
            ..Self::empty(StreamKind::Start)
        }
    }

    pub fn chunk(
        agent_id: impl Into<String>,
        message_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            message_id: message_id.into(),
            content: content.into(),
            ..Self::empty(StreamKind::Chunk)
        }
    }

    pub fn end(agent_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            message_id: message_id.into(),
            ..Self::empty(StreamKind::End)
        }
    }

    pub fn error(
        agent_id: impl Into<String>,
        message_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            message_id: message_id.into(),
            error: error.into(),
            ..Self::empty(StreamKind::Error)
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StreamKind::End | StreamKind::Error)
    }
}

/// Snapshot of the session for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebateStatus {
    pub is_running: bool,
    pub topic: String,
    pub mode: DebateMode,
    pub turn_in_progress: bool,
    pub message_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mode_wire_names() {
        assert_eq!("free_form".parse::<DebateMode>(), Ok(DebateMode::FreeForm));
        assert!("chaos".parse::<DebateMode>().is_err());
        assert_eq!(
            serde_json::to_string(&DebateMode::RoundRobin).unwrap(),
            "\"round_robin\""
        );
    }

    #[test]
    fn test_stream_message_omits_empty_fields() {
        let json = serde_json::to_value(StreamMessage::end("critic", "msg_3")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "end", "agent_id": "critic", "message_id": "msg_3"})
        );

        let json = serde_json::to_value(StreamMessage::start("a", "A", "#fff", "msg_1")).unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["agent_name"], "A");
        assert!(json.get("content").is_none());
        assert!(json.get("error").is_none());
    }
}
