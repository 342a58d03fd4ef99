//! API route handlers

pub mod gateway;

use agora_core::config::{load_config, resolve_config_path};
use agora_core::{build_roster, AgoraError, BroadcastHub, DebateMode, TurnHandle};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// Core error rendered as `{"error": message}` with a matching status
#[derive(Debug)]
pub struct ApiError(AgoraError);

impl From<AgoraError> for ApiError {
    fn from(err: AgoraError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AgoraError::AlreadyRunning | AgoraError::TurnInProgress => StatusCode::CONFLICT,
            AgoraError::NotRunning | AgoraError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AgoraError::AgentNotFound(_) => StatusCode::NOT_FOUND,
            AgoraError::NoAgents => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": agora_core::version(),
        "agents": state.manager.agents().len(),
        "clients": state.hub.subscriber_count()
    }))
}

// ========== Roster ==========

pub async fn get_agents(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.agents())
}

/// Re-read the config file and swap the roster and gateway settings
pub async fn reload_agents(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let path = state.config_path.clone().or_else(resolve_config_path);
    let config = load_config(path.as_deref()).map_err(AgoraError::from)?;

    let roster = build_roster(&config.resolved_agents());
    state.manager.update_agents(roster);
    state.gateway.reload(&config);

    let agents = state.manager.agents();
    state
        .hub
        .broadcast_json(&json!({ "type": "agents_updated", "agents": agents }))
        .await;

    Ok(Json(json!({ "status": "reloaded", "agents": agents })))
}

// ========== Debate session ==========

#[derive(Deserialize)]
pub struct TopicRequest {
    #[serde(default)]
    topic: String,
}

pub async fn debate_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.status())
}

pub async fn start_debate(
    State(state): State<AppState>,
    Json(req): Json<TopicRequest>,
) -> ApiResult<impl IntoResponse> {
    state.manager.start(&req.topic)?;
    let topic = state.manager.topic();

    state
        .hub
        .broadcast_json(&json!({
            "type": "debate_started",
            "topic": topic,
            "mode": state.manager.mode()
        }))
        .await;

    Ok(Json(json!({ "status": "started", "topic": topic })))
}

pub async fn continue_debate(
    State(state): State<AppState>,
    Json(req): Json<TopicRequest>,
) -> ApiResult<impl IntoResponse> {
    state.manager.continue_topic(&req.topic)?;
    let topic = state.manager.topic();

    state
        .hub
        .broadcast_json(&json!({
            "type": "topic_changed",
            "topic": topic,
            "continued": true
        }))
        .await;

    Ok(Json(json!({ "status": "continued", "topic": topic })))
}

pub async fn stop_debate(State(state): State<AppState>) -> impl IntoResponse {
    state.manager.stop();
    state
        .hub
        .broadcast_json(&json!({ "type": "debate_stopped" }))
        .await;
    Json(json!({ "status": "stopped" }))
}

/// Relay one turn's events to every connected client
fn forward_turn(hub: Arc<BroadcastHub>, mut turn: TurnHandle) {
    tokio::spawn(async move {
        while let Some(event) = turn.events.recv().await {
            hub.broadcast_json(&event).await;
        }
        tracing::debug!("Turn {} forwarded", turn.message_id);
    });
}

pub async fn next_turn(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let turn = state.manager.next_turn()?;
    let body = json!({
        "status": "processing",
        "agent_id": turn.agent.id,
        "message_id": turn.message_id
    });
    forward_turn(Arc::clone(&state.hub), turn);
    Ok(Json(body))
}

pub async fn agent_turn(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let turn = state.manager.turn_by_agent(&agent_id)?;
    let body = json!({
        "status": "processing",
        "agent_id": turn.agent.id,
        "message_id": turn.message_id
    });
    forward_turn(Arc::clone(&state.hub), turn);
    Ok(Json(body))
}

pub async fn get_messages(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.messages())
}

#[derive(Deserialize)]
pub struct ModeRequest {
    #[serde(default)]
    mode: String,
}

pub async fn get_mode(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "mode": state.manager.mode() }))
}

pub async fn set_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> ApiResult<impl IntoResponse> {
    let mode: DebateMode = req.mode.parse().map_err(AgoraError::invalid_request)?;
    state.manager.set_mode(mode);

    state
        .hub
        .broadcast_json(&json!({ "type": "mode_changed", "mode": mode }))
        .await;

    Ok(Json(json!({ "mode": mode })))
}

pub async fn reset_debate(State(state): State<AppState>) -> impl IntoResponse {
    state.manager.reset();
    state
        .hub
        .broadcast_json(&json!({ "type": "debate_reset" }))
        .await;
    Json(json!({ "status": "reset" }))
}

// ========== WebSocket ==========

pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Push hub payloads to the socket until either side goes away. Payloads
/// already queued are sent together, one JSON document per line.
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.hub.register();
    let client_id = subscription.id;

    let mut send_task = tokio::spawn(async move {
        while let Some(batch) = subscription.next_batch().await {
            if sender.send(Message::Text(batch)).await.is_err() {
                break;
            }
        }
    });

    // Clients only listen; drain their frames to notice the close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(text) => tracing::trace!("Ignoring client message: {}", text),
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(client_id);
}
