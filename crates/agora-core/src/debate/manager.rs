//! Debate session state machine
//!
//! ```text
//!   Idle ──start──▶ Running ──next_turn──▶ Turn-Executing
//!    ▲                ▲  │                      │
//!    │ reset          │  └──────── turn done ◀──┘
//!    └──── stop ──────┴─────────────────────────┘
//! ```
//!
//! The session lock is only held to read or mutate state, never across an
//! upstream call. Turn triggers validate and claim the session synchronously,
//! then stream on a spawned task.

use super::context::build_context;
use super::sanitize::clean_message_content;
use super::types::{
    DebateMessage, DebateMode, DebateStatus, StreamMessage, SYSTEM_AGENT_ID,
};
use crate::agent::{Agent, AgentInfo};
use crate::error::{AgoraError, Result};
use crate::llm::{ChatMessage, ChatOptions, LlmError, LlmEvent, LlmStream};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of a turn's event channel
pub const TURN_EVENT_CAPACITY: usize = 100;

const SEPARATOR_NAME: &str = "System";
const SEPARATOR_COLOR: &str = "#888888";

/// A claimed turn. Events arrive on `events`: one `start`, any number of
/// `chunk`s, then exactly one `end` or `error`.
#[derive(Debug)]
pub struct TurnHandle {
    pub message_id: String,
    pub agent: AgentInfo,
    pub events: mpsc::Receiver<StreamMessage>,
}

struct SessionState {
    roster: Vec<Arc<Agent>>,
    messages: Vec<DebateMessage>,
    topic: String,
    mode: DebateMode,
    running: bool,
    /// Sequence number of the turn holding the session, if any
    active_turn: Option<u64>,
    cursor: usize,
    msg_counter: u64,
    turn_seq: u64,
    /// Present iff `running`
    cancel: Option<CancellationToken>,
}

impl SessionState {
    fn next_message_id(&mut self) -> String {
        self.msg_counter += 1;
        format!("msg_{}", self.msg_counter)
    }

    fn check_can_take_turn(&self) -> Result<()> {
        if !self.running {
            return Err(AgoraError::NotRunning);
        }
        if self.active_turn.is_some() {
            return Err(AgoraError::TurnInProgress);
        }
        if self.roster.is_empty() {
            return Err(AgoraError::NoAgents);
        }
        Ok(())
    }

    fn select_speaker(&mut self) -> Arc<Agent> {
        let n = self.roster.len();
        match self.mode {
            DebateMode::RoundRobin => {
                let index = self.cursor % n;
                self.cursor = (index + 1) % n;
                Arc::clone(&self.roster[index])
            }
            DebateMode::FreeForm => {
                let last_speaker = self
                    .messages
                    .iter()
                    .rev()
                    .find(|m| !m.is_system())
                    .map(|m| m.agent_id.clone());

                let Some(last_speaker) = last_speaker else {
                    return Arc::clone(&self.roster[0]);
                };

                match self.roster.iter().position(|a| a.id() != last_speaker) {
                    Some(index) => {
                        self.cursor = index;
                    }
                    // Single-agent roster: repeats are unavoidable
                    None => {
                        self.cursor = (self.cursor + 1) % n;
                    }
                }
                Arc::clone(&self.roster[self.cursor % n])
            }
        }
    }

    /// Mark the session busy and collect everything the turn needs
    fn claim(&mut self, agent: Arc<Agent>) -> Result<TurnTicket> {
        let cancel = self.cancel.clone().ok_or(AgoraError::NotRunning)?;
        self.turn_seq += 1;
        self.active_turn = Some(self.turn_seq);

        let context = build_context(&self.topic, &self.roster, &self.messages, &agent);
        Ok(TurnTicket {
            seq: self.turn_seq,
            message_id: self.next_message_id(),
            agent,
            context,
            cancel,
        })
    }
}

struct TurnTicket {
    seq: u64,
    message_id: String,
    agent: Arc<Agent>,
    context: Vec<ChatMessage>,
    cancel: CancellationToken,
}

enum TurnOutcome {
    Finished,
    Cancelled,
    Failed(LlmError),
}

/// Debate session shared between the transport and turn workers
pub struct DebateManager {
    state: RwLock<SessionState>,
}

impl DebateManager {
    pub fn new(roster: Vec<Arc<Agent>>) -> Self {
        Self {
            state: RwLock::new(SessionState {
                roster,
                messages: Vec::new(),
                topic: String::new(),
                mode: DebateMode::default(),
                running: false,
                active_turn: None,
                cursor: 0,
                msg_counter: 0,
                turn_seq: 0,
                cancel: None,
            }),
        }
    }

    /// Begin a fresh debate on `topic`
    pub fn start(&self, topic: &str) -> Result<()> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AgoraError::invalid_request("topic is required"));
        }

        let mut state = self.state.write();
        if state.running {
            return Err(AgoraError::AlreadyRunning);
        }

        state.topic = topic.to_string();
        state.messages.clear();
        state.cursor = 0;
        state.msg_counter = 0;
        state.running = true;
        state.cancel = Some(CancellationToken::new());

        tracing::info!("Debate started: {}", topic);
        Ok(())
    }

    /// Switch to `topic`, keeping history. Valid in any state.
    pub fn continue_topic(&self, topic: &str) -> Result<()> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AgoraError::invalid_request("topic is required"));
        }

        let mut state = self.state.write();
        if !state.messages.is_empty() {
            let id = state.next_message_id();
            state.messages.push(DebateMessage {
                id,
                agent_id: SYSTEM_AGENT_ID.to_string(),
                agent_name: SEPARATOR_NAME.to_string(),
                content: format!("--- New topic: {} ---", topic),
                timestamp: Utc::now(),
                color: SEPARATOR_COLOR.to_string(),
            });
        }

        state.topic = topic.to_string();
        state.running = true;
        if state.cancel.as_ref().map_or(true, |c| c.is_cancelled()) {
            state.cancel = Some(CancellationToken::new());
        }

        tracing::info!("Debate continued with new topic: {}", topic);
        Ok(())
    }

    /// Abort any in-flight turn and leave the running state
    pub fn stop(&self) {
        let mut state = self.state.write();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.running = false;
        state.active_turn = None;
        tracing::info!("Debate stopped");
    }

    /// Stop and forget everything but the roster and mode
    pub fn reset(&self) {
        let mut state = self.state.write();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.running = false;
        state.active_turn = None;
        state.messages.clear();
        state.topic.clear();
        state.cursor = 0;
        state.msg_counter = 0;
        tracing::info!("Debate reset");
    }

    /// Takes effect on the next turn
    pub fn set_mode(&self, mode: DebateMode) {
        self.state.write().mode = mode;
        tracing::debug!("Debate mode set to {}", mode);
    }

    pub fn mode(&self) -> DebateMode {
        self.state.read().mode
    }

    pub fn topic(&self) -> String {
        self.state.read().topic.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    pub fn status(&self) -> DebateStatus {
        let state = self.state.read();
        DebateStatus {
            is_running: state.running,
            topic: state.topic.clone(),
            mode: state.mode,
            turn_in_progress: state.active_turn.is_some(),
            message_count: state.messages.len(),
        }
    }

    pub fn agents(&self) -> Vec<AgentInfo> {
        self.state
            .read()
            .roster
            .iter()
            .map(|a| a.info().clone())
            .collect()
    }

    /// Snapshot of the message log
    pub fn messages(&self) -> Vec<DebateMessage> {
        self.state.read().messages.clone()
    }

    /// Replace the roster wholesale. In-flight turns keep the agent they
    /// resolved when they were claimed.
    pub fn update_agents(&self, roster: Vec<Arc<Agent>>) {
        let mut state = self.state.write();
        state.roster = roster;
        state.cursor = 0;
        tracing::info!("Roster updated: {} agents", state.roster.len());
    }

    /// Let the next scheduled speaker take a turn
    pub fn next_turn(self: &Arc<Self>) -> Result<TurnHandle> {
        let ticket = {
            let mut state = self.state.write();
            state.check_can_take_turn()?;
            let speaker = state.select_speaker();
            state.claim(speaker)?
        };
        Ok(self.launch(ticket))
    }

    /// Let a specific agent take a turn, out of schedule
    pub fn turn_by_agent(self: &Arc<Self>, agent_id: &str) -> Result<TurnHandle> {
        let ticket = {
            let mut state = self.state.write();
            state.check_can_take_turn()?;
            let speaker = state
                .roster
                .iter()
                .find(|a| a.id() == agent_id)
                .cloned()
                .ok_or_else(|| AgoraError::agent_not_found(agent_id))?;
            state.claim(speaker)?
        };
        Ok(self.launch(ticket))
    }

    fn launch(self: &Arc<Self>, mut ticket: TurnTicket) -> TurnHandle {
        tracing::info!(
            "Turn {} ({}) claimed by {}",
            ticket.seq,
            ticket.message_id,
            ticket.agent.id()
        );

        let (tx, rx) = mpsc::channel(TURN_EVENT_CAPACITY);
        let context = std::mem::take(&mut ticket.context);
        let upstream = ticket
            .agent
            .respond(context, &ChatOptions::default(), ticket.cancel.clone());

        let handle = TurnHandle {
            message_id: ticket.message_id.clone(),
            agent: ticket.agent.info().clone(),
            events: rx,
        };

        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run_turn(ticket, upstream, tx).await });

        handle
    }

    async fn run_turn(
        self: Arc<Self>,
        ticket: TurnTicket,
        mut upstream: LlmStream,
        tx: mpsc::Sender<StreamMessage>,
    ) {
        let agent = ticket.agent.info();
        let _ = tx
            .send(StreamMessage::start(
                &agent.id,
                &agent.name,
                &agent.color,
                &ticket.message_id,
            ))
            .await;

        let mut text = String::new();
        let outcome = loop {
            match upstream.recv().await {
                Some(LlmEvent::Chunk(chunk)) => {
                    text.push_str(&chunk);
                    let _ = tx
                        .send(StreamMessage::chunk(&agent.id, &ticket.message_id, chunk))
                        .await;
                }
                Some(LlmEvent::Done) => break TurnOutcome::Finished,
                Some(LlmEvent::Cancelled) => break TurnOutcome::Cancelled,
                Some(LlmEvent::Error(e)) => break TurnOutcome::Failed(e),
                None => {
                    break TurnOutcome::Failed(LlmError::Stream(
                        "provider stream closed without a result".to_string(),
                    ))
                }
            }
        };

        let terminal = self.finish_turn(&ticket, outcome, text);
        let _ = tx.send(terminal).await;
    }

    /// Release the session and commit the message if the turn still counts
    fn finish_turn(&self, ticket: &TurnTicket, outcome: TurnOutcome, text: String) -> StreamMessage {
        let agent = ticket.agent.info();
        let mut state = self.state.write();

        let owns_session = state.active_turn == Some(ticket.seq);
        if owns_session {
            state.active_turn = None;
        }

        if ticket.cancel.is_cancelled() || !owns_session {
            tracing::debug!(
                "Turn {} aborted, discarding {} bytes",
                ticket.message_id,
                text.len()
            );
            return StreamMessage::end(&agent.id, &ticket.message_id);
        }

        match outcome {
            TurnOutcome::Finished => {
                let content = clean_message_content(&text);
                if content.len() != text.len() {
                    tracing::debug!(
                        "Content cleaned: {} -> {} bytes",
                        text.len(),
                        content.len()
                    );
                }
                state.messages.push(DebateMessage {
                    id: ticket.message_id.clone(),
                    agent_id: agent.id.clone(),
                    agent_name: agent.name.clone(),
                    content,
                    timestamp: Utc::now(),
                    color: agent.color.clone(),
                });
                tracing::info!("Turn {} completed by {}", ticket.message_id, agent.id);
                StreamMessage::end(&agent.id, &ticket.message_id)
            }
            TurnOutcome::Cancelled => StreamMessage::end(&agent.id, &ticket.message_id),
            TurnOutcome::Failed(e) => {
                tracing::warn!("Turn {} by {} failed: {}", ticket.message_id, agent.id, e);
                StreamMessage::error(&agent.id, &ticket.message_id, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::StreamKind;
    use crate::testing::{scripted_agent, ScriptedProvider};
    use pretty_assertions::assert_eq;

    async fn drain(mut handle: TurnHandle) -> Vec<StreamMessage> {
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            events.push(event);
        }
        events
    }

    fn kinds(events: &[StreamMessage]) -> Vec<StreamKind> {
        events.iter().map(|e| e.kind).collect()
    }

    fn two_agents() -> Arc<DebateManager> {
        Arc::new(DebateManager::new(vec![
            scripted_agent("a", ScriptedProvider::replying(&["Cars ", "pollute."])),
            scripted_agent("b", ScriptedProvider::replying(&["Buses ", "help."])),
        ]))
    }

    #[tokio::test]
    async fn test_round_robin_example() {
        let manager = two_agents();
        manager.start("Should cities ban cars?").unwrap();

        let handle = manager.next_turn().unwrap();
        assert_eq!(handle.agent.id, "a");
        let events = drain(handle).await;
        assert_eq!(
            kinds(&events),
            vec![StreamKind::Start, StreamKind::Chunk, StreamKind::Chunk, StreamKind::End]
        );
        assert_eq!(events[0].message_id, "msg_1");

        let messages = manager.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Cars pollute.");
        assert_eq!(messages[0].agent_name, "A");

        let handle = manager.next_turn().unwrap();
        assert_eq!(handle.agent.id, "b");
        drain(handle).await;
    }

    #[tokio::test]
    async fn test_round_robin_order_wraps() {
        let manager = Arc::new(DebateManager::new(vec![
            scripted_agent("a", ScriptedProvider::replying(&["x"])),
            scripted_agent("b", ScriptedProvider::replying(&["x"])),
            scripted_agent("c", ScriptedProvider::replying(&["x"])),
        ]));
        manager.start("topic").unwrap();

        let mut speakers = Vec::new();
        for _ in 0..7 {
            let handle = manager.next_turn().unwrap();
            speakers.push(handle.agent.id.clone());
            drain(handle).await;
        }
        assert_eq!(speakers, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_free_form_never_repeats() {
        let manager = Arc::new(DebateManager::new(vec![
            scripted_agent("a", ScriptedProvider::replying(&["x"])),
            scripted_agent("b", ScriptedProvider::replying(&["y"])),
            scripted_agent("c", ScriptedProvider::replying(&["z"])),
        ]));
        manager.set_mode(DebateMode::FreeForm);
        manager.start("topic").unwrap();

        let mut previous = String::new();
        for _ in 0..6 {
            let handle = manager.next_turn().unwrap();
            assert_ne!(handle.agent.id, previous);
            previous = handle.agent.id.clone();
            drain(handle).await;
        }

        let handle = manager.turn_by_agent("c").unwrap();
        drain(handle).await;
        let handle = manager.next_turn().unwrap();
        assert_ne!(handle.agent.id, "c");
    }

    #[tokio::test]
    async fn test_free_form_single_agent_repeats() {
        let manager = Arc::new(DebateManager::new(vec![scripted_agent(
            "solo",
            ScriptedProvider::replying(&["x"]),
        )]));
        manager.set_mode(DebateMode::FreeForm);
        manager.start("topic").unwrap();
        for _ in 0..3 {
            let handle = manager.next_turn().unwrap();
            assert_eq!(handle.agent.id, "solo");
            drain(handle).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_next_turn_single_winner() {
        let manager = Arc::new(DebateManager::new(vec![
            scripted_agent("a", ScriptedProvider::hanging()),
            scripted_agent("b", ScriptedProvider::hanging()),
        ]));
        manager.start("topic").unwrap();

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.next_turn() })
            })
            .collect();

        let mut winners = Vec::new();
        let mut losers = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(handle) => winners.push(handle),
                Err(AgoraError::TurnInProgress) => losers += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(losers, 15);
        assert!(manager.status().turn_in_progress);
        manager.stop();
    }

    #[tokio::test]
    async fn test_stop_mid_stream_ends_cleanly() {
        let manager = Arc::new(DebateManager::new(vec![scripted_agent(
            "a",
            ScriptedProvider::hanging_after(&["partial "]),
        )]));
        manager.start("topic").unwrap();

        let mut handle = manager.next_turn().unwrap();
        assert_eq!(handle.events.recv().await.unwrap().kind, StreamKind::Start);
        assert_eq!(handle.events.recv().await.unwrap().kind, StreamKind::Chunk);

        manager.stop();
        let rest = drain(handle).await;
        assert_eq!(kinds(&rest), vec![StreamKind::End]);
        assert!(manager.messages().is_empty());
        assert!(!manager.status().turn_in_progress);
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_running() {
        let manager = Arc::new(DebateManager::new(vec![
            scripted_agent("a", ScriptedProvider::failing(LlmError::from_status(429, "slow down"))),
            scripted_agent("b", ScriptedProvider::replying(&["fine"])),
        ]));
        manager.start("topic").unwrap();

        let events = drain(manager.next_turn().unwrap()).await;
        let last = events.last().unwrap();
        assert_eq!(last.kind, StreamKind::Error);
        assert_eq!(last.agent_id, "a");
        assert!(last.error.contains("429"));
        assert!(manager.is_running());
        assert!(manager.messages().is_empty());

        let events = drain(manager.turn_by_agent("b").unwrap()).await;
        assert_eq!(events.last().unwrap().kind, StreamKind::End);
        assert_eq!(manager.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_state_errors() {
        let manager = two_agents();
        assert!(matches!(manager.next_turn(), Err(AgoraError::NotRunning)));

        manager.start("topic").unwrap();
        assert!(matches!(manager.start("again"), Err(AgoraError::AlreadyRunning)));
        assert!(matches!(
            manager.turn_by_agent("nobody"),
            Err(AgoraError::AgentNotFound(_))
        ));

        manager.update_agents(Vec::new());
        assert!(matches!(manager.next_turn(), Err(AgoraError::NoAgents)));
        assert!(matches!(manager.start("  "), Err(AgoraError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_continue_adds_separator_and_keeps_history() {
        let manager = two_agents();
        manager.start("Cars").unwrap();
        drain(manager.next_turn().unwrap()).await;
        manager.stop();

        manager.continue_topic("Trains").unwrap();
        assert!(manager.is_running());
        assert_eq!(manager.topic(), "Trains");

        let messages = manager.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].agent_id, SYSTEM_AGENT_ID);
        assert_eq!(messages[1].id, "msg_2");
        assert!(messages[1].content.contains("Trains"));

        let handle = manager.next_turn().unwrap();
        assert_eq!(handle.message_id, "msg_3");
        drain(handle).await;
    }

    #[tokio::test]
    async fn test_continue_on_empty_history_has_no_separator() {
        let manager = two_agents();
        manager.continue_topic("Fresh").unwrap();
        assert!(manager.messages().is_empty());
        assert!(manager.is_running());
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let manager = two_agents();
        manager.set_mode(DebateMode::FreeForm);
        manager.start("topic").unwrap();
        drain(manager.next_turn().unwrap()).await;

        manager.reset();
        let status = manager.status();
        assert!(!status.is_running);
        assert_eq!(status.topic, "");
        assert_eq!(status.message_count, 0);
        assert_eq!(status.mode, DebateMode::FreeForm);

        manager.start("again").unwrap();
        let handle = manager.next_turn().unwrap();
        assert_eq!(handle.message_id, "msg_1");
        assert_eq!(handle.agent.id, "a");
    }

    #[tokio::test]
    async fn test_sanitizes_before_storing() {
        let manager = Arc::new(DebateManager::new(vec![scripted_agent(
            "a",
            ScriptedProvider::replying(&["<thinking>private</thinking>", "Public answer."]),
        )]));
        manager.start("topic").unwrap();
        let events = drain(manager.next_turn().unwrap()).await;

        // Live chunks are forwarded verbatim
        assert_eq!(events[1].content, "<thinking>private</thinking>");
        assert_eq!(manager.messages()[0].content, "Public answer.");
    }
}
