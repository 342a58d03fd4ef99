//! In-memory providers for unit tests

use crate::agent::{Agent, AgentInfo};
use crate::llm::{ChatMessage, ChatOptions, LlmError, LlmEvent, LlmProvider, LlmStream};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Ending {
    Done,
    Fail(LlmError),
    /// Wait for cancellation
    Hang,
}

/// Plays back a fixed script, then ends as configured
pub struct ScriptedProvider {
    chunks: Vec<String>,
    ending: Ending,
    pub seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    fn new(chunks: &[&str], ending: Ending) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ending,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(chunks: &[&str]) -> Self {
        Self::new(chunks, Ending::Done)
    }

    pub fn failing(error: LlmError) -> Self {
        Self::new(&[], Ending::Fail(error))
    }

    pub fn hanging() -> Self {
        Self::new(&[], Ending::Hang)
    }

    pub fn hanging_after(chunks: &[&str]) -> Self {
        Self::new(chunks, Ending::Hang)
    }
}

impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn model(&self) -> String {
        "script-1".to_string()
    }

    fn chat(
        &self,
        messages: Vec<ChatMessage>,
        _options: &ChatOptions,
        cancel: CancellationToken,
    ) -> LlmStream {
        self.seen.lock().push(messages);

        let (tx, rx) = mpsc::channel(16);
        let chunks = self.chunks.clone();
        let ending = self.ending.clone();
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(LlmEvent::Chunk(chunk)).await.is_err() {
                    return;
                }
            }
            let terminal = match ending {
                Ending::Done => LlmEvent::Done,
                Ending::Fail(e) => LlmEvent::Error(e),
                Ending::Hang => {
                    cancel.cancelled().await;
                    LlmEvent::Cancelled
                }
            };
            let _ = tx.send(terminal).await;
        });
        rx
    }
}

/// Agent `id` named after its capitalised id, backed by `provider`
pub fn scripted_agent(id: &str, provider: ScriptedProvider) -> Arc<Agent> {
    let mut name = id.to_string();
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    Arc::new(Agent::new(
        AgentInfo {
            id: id.to_string(),
            name,
            role: format!("{} role", id),
            color: "#000000".to_string(),
        },
        "",
        ChatOptions::default(),
        Arc::new(provider),
    ))
}
