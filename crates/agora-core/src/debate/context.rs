//! Per-turn prompt construction
//!
//! Every earlier contribution is replayed as a `user` message prefixed with
//! its author. Some upstreams sign the reasoning blocks of assistant turns
//! and reject replayed assistant turns without a valid signature, so history
//! is never sent with the assistant role.

use super::sanitize::clean_message_content;
use super::DebateMessage;
use crate::agent::Agent;
use crate::llm::ChatMessage;
use std::fmt::Write;
use std::sync::Arc;

const CONTINUE_PROMPT: &str = "Continue the discussion. Respond to the points made so far and \
give your own view. Do NOT start your reply with your name.";

/// Opening instruction naming the topic, the panel and the speaker
pub fn topic_prompt(topic: &str, roster: &[Arc<Agent>], speaker: &Agent) -> String {
    let mut prompt = format!("Discussion topic: \"{}\"\n\nParticipants:\n", topic);
    for agent in roster {
        let _ = writeln!(prompt, "- {}: {}", agent.name(), agent.info().role);
    }
    let _ = write!(
        prompt,
        "\nYou are {}. Give your view on this topic.\n\
         Keep it short (2-4 paragraphs). Do NOT put your name at the start of your answer.",
        speaker.name()
    );
    prompt
}

/// Build the message list for `speaker`'s turn.
pub fn build_context(
    topic: &str,
    roster: &[Arc<Agent>],
    history: &[DebateMessage],
    speaker: &Agent,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::user(topic_prompt(topic, roster, speaker)));

    for msg in history.iter().filter(|m| !m.is_system()) {
        let content = clean_message_content(&msg.content);
        messages.push(ChatMessage::user(format!(
            "**{}** said:\n{}",
            msg.agent_name, content
        )));
    }

    if !history.is_empty() {
        messages.push(ChatMessage::user(CONTINUE_PROMPT));
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentInfo;
    use crate::llm::{create_provider, ChatOptions, ProviderConfig, ProviderKind, Role};
    use chrono::Utc;

    fn agent(id: &str, name: &str, role: &str) -> Arc<Agent> {
        let provider = create_provider(&ProviderConfig::new(ProviderKind::Ollama)).unwrap();
        Arc::new(Agent::new(
            AgentInfo {
                id: id.into(),
                name: name.into(),
                role: role.into(),
                color: String::new(),
            },
            "",
            ChatOptions::default(),
            provider,
        ))
    }

    fn message(agent_id: &str, agent_name: &str, content: &str) -> DebateMessage {
        DebateMessage {
            id: "msg_1".into(),
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            content: content.into(),
            timestamp: Utc::now(),
            color: String::new(),
        }
    }

    #[tokio::test]
    async fn test_first_turn_has_only_topic() {
        let roster = vec![agent("a", "Alice", "optimist"), agent("b", "Bob", "sceptic")];
        let messages = build_context("Ban cars?", &roster, &[], &roster[1]);

        assert_eq!(messages.len(), 1);
        let prompt = &messages[0].content;
        assert!(prompt.contains("\"Ban cars?\""));
        assert!(prompt.contains("- Alice: optimist\n- Bob: sceptic\n"));
        assert!(prompt.contains("You are Bob."));
    }

    #[tokio::test]
    async fn test_history_flattened_to_user_role() {
        let roster = vec![agent("a", "Alice", "optimist"), agent("b", "Bob", "sceptic")];
        let history = vec![
            message("a", "Alice", "<thinking>plan</thinking>Yes."),
            message("system", "System", "--- new topic: Trains ---"),
            message("b", "Bob", "No."),
        ];
        let messages = build_context("Trains", &roster, &history, &roster[0]);

        assert_eq!(messages.len(), 4);
        assert!(messages.iter().all(|m| m.role == Role::User));
        assert_eq!(messages[1].content, "**Alice** said:\nYes.");
        assert_eq!(messages[2].content, "**Bob** said:\nNo.");
        assert_eq!(messages[3].content, CONTINUE_PROMPT);
    }
}
