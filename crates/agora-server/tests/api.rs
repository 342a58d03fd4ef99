//! Router tests driven with `tower::ServiceExt::oneshot`

use agora_core::{AgentConfig, AgoraConfig, StreamMessage};
use agora_server::{build_router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::Router;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tower::ServiceExt;

/// Ollama-shaped upstream that always answers "Cities thrive."
async fn mock_ollama() -> String {
    let app = Router::new().route(
        "/api/chat",
        post(|| async {
            concat!(
                "{\"message\":{\"role\":\"assistant\",\"content\":\"Cities \"},\"done\":false}\n",
                "{\"message\":{\"role\":\"assistant\",\"content\":\"thrive.\"},\"done\":false}\n",
                "{\"done\":true}\n"
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn agent(id: &str, base_url: &str) -> AgentConfig {
    AgentConfig {
        id: id.to_string(),
        name: id.to_uppercase(),
        role: "tester".to_string(),
        provider: "ollama".to_string(),
        model: "llama2".to_string(),
        color: "#123456".to_string(),
        base_url: base_url.to_string(),
        ..Default::default()
    }
}

async fn test_state() -> AppState {
    let base = mock_ollama().await;
    let config = AgoraConfig {
        agents: vec![agent("pro", &base), agent("con", &base)],
        ..Default::default()
    };
    AppState::new(&config, None)
}

async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_reports_roster() {
    let state = test_state().await;
    let (status, body) = call(&state, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agents"], 2);
}

#[tokio::test]
async fn debate_lifecycle_status_codes() {
    let state = test_state().await;

    let (status, _) = call(&state, "POST", "/api/debate/next", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&state, "POST", "/api/debate/start", Some(json!({"topic": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &state,
        "POST",
        "/api/debate/start",
        Some(json!({"topic": "Should cities ban cars?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "started", "topic": "Should cities ban cars?"}));

    let (status, _) = call(&state, "POST", "/api/debate/start", Some(json!({"topic": "again"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&state, "POST", "/api/debate/agent/nobody", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&state, "GET", "/api/debate/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_running"], true);
    assert_eq!(body["mode"], "round_robin");

    let (status, body) = call(&state, "POST", "/api/debate/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stopped");

    let (status, body) = call(&state, "POST", "/api/debate/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "reset");
}

#[tokio::test]
async fn mode_validation() {
    let state = test_state().await;

    let (status, _) = call(&state, "POST", "/api/debate/mode", Some(json!({"mode": "chaos"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        call(&state, "POST", "/api/debate/mode", Some(json!({"mode": "free_form"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "free_form");

    let (_, body) = call(&state, "GET", "/api/debate/mode", None).await;
    assert_eq!(body["mode"], "free_form");
}

#[tokio::test]
async fn turn_streams_to_subscribers_and_is_stored() {
    let state = test_state().await;
    let mut client = state.hub.register();

    call(&state, "POST", "/api/debate/start", Some(json!({"topic": "Cars"}))).await;
    let started: Value =
        serde_json::from_str(&timeout(Duration::from_secs(5), client.recv()).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(started["type"], "debate_started");

    let (status, body) = call(&state, "POST", "/api/debate/next", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");
    assert_eq!(body["agent_id"], "pro");

    let mut events = Vec::new();
    loop {
        let payload = timeout(Duration::from_secs(5), client.recv())
            .await
            .unwrap()
            .unwrap();
        let event: StreamMessage = serde_json::from_str(&payload).unwrap();
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }

    let kinds: Vec<String> = events
        .iter()
        .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["start", "chunk", "chunk", "end"]);

    // The commit happens before `end` is emitted
    let (_, messages) = call(&state, "GET", "/api/debate/messages", None).await;
    assert_eq!(messages.as_array().unwrap().len(), 1);
    assert_eq!(messages[0]["content"], "Cities thrive.");
    assert_eq!(messages[0]["agent_id"], "pro");
}

#[tokio::test]
async fn gateway_models_and_settings() {
    let state = test_state().await;

    let (status, body) = call(&state, "GET", "/v1/models", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"].as_array().unwrap().len(), 8);

    let (status, body) = call(
        &state,
        "POST",
        "/api/settings/proxy",
        Some(json!({"default_provider": "nowhere", "enable_logging": false})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");

    let (status, body) = call(
        &state,
        "POST",
        "/api/settings/proxy",
        Some(json!({"default_provider": "ollama", "enable_logging": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"default_provider": "ollama", "enable_logging": false}));
}

#[tokio::test]
async fn gateway_missing_key_is_401() {
    let state = test_state().await;
    let (status, body) = call(
        &state,
        "POST",
        "/v1/chat/completions",
        Some(json!({"model": "gpt-4", "provider": "openai", "messages": [{"role": "user", "content": "hi"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "authentication_error");
    assert_eq!(
        body["error"]["message"],
        "No API key configured for provider: openai"
    );
}

#[tokio::test]
async fn gateway_rejects_malformed_body() {
    let state = test_state().await;
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gateway_streams_sse_until_done() {
    let base = mock_ollama().await;
    let mut config = AgoraConfig::default();
    config.gateway.default_provider = "ollama".to_string();
    config.providers.insert(
        "ollama".to_string(),
        agora_core::ProviderSection {
            base_url: base,
            ..Default::default()
        },
    );
    let state = AppState::new(&config, None);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"model": "llama2", "stream": true, "messages": [{"role": "user", "content": "hi"}]})
                .to_string(),
        ))
        .unwrap();
    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let bytes = timeout(Duration::from_secs(5), response.into_body().collect())
        .await
        .unwrap()
        .unwrap()
        .to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let payloads: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(payloads.last(), Some(&"[DONE]"));
    let content: String = payloads
        .iter()
        .filter_map(|p| serde_json::from_str::<Value>(p).ok())
        .filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(str::to_string))
        .collect();
    assert_eq!(content, "Cities thrive.");
}
