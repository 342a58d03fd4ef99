//! Agora Server Library
//!
//! HTTP/WebSocket transport for the debate manager and the
//! OpenAI-compatible gateway.

pub mod routes;
pub mod state;

use agora_core::config::{load_config, resolve_config_path};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Once;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use state::AppState;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing subscriber (only once)
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| {
                    "agora_server=debug,agora_core=info,tower_http=debug".into()
                }),
            ))
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

/// Build the Axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health_check))
        // Roster
        .route("/api/agents", get(routes::get_agents))
        .route("/api/agents/reload", post(routes::reload_agents))
        // Debate session
        .route("/api/debate/status", get(routes::debate_status))
        .route("/api/debate/start", post(routes::start_debate))
        .route("/api/debate/continue", post(routes::continue_debate))
        .route("/api/debate/stop", post(routes::stop_debate))
        .route("/api/debate/next", post(routes::next_turn))
        .route("/api/debate/agent/:id", post(routes::agent_turn))
        .route("/api/debate/messages", get(routes::get_messages))
        .route(
            "/api/debate/mode",
            get(routes::get_mode).post(routes::set_mode),
        )
        .route("/api/debate/reset", post(routes::reset_debate))
        .route("/ws", get(routes::websocket_handler))
        // Gateway
        .route("/v1/chat/completions", post(routes::gateway::chat_completions))
        .route("/v1/models", get(routes::gateway::list_models))
        .route("/v1/proxy", post(routes::gateway::raw_proxy))
        .route(
            "/api/settings/proxy",
            get(routes::gateway::get_settings).post(routes::gateway::update_settings),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the Agora server. `port` overrides `[server] port`.
pub async fn run_server(port: Option<u16>) -> anyhow::Result<()> {
    // Initialize tracing (if not already done)
    init_tracing();

    tracing::info!("Starting Agora Server v{}...", agora_core::version());

    // Load configuration
    let config_path = resolve_config_path();
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Falling back to default configuration: {}", e);
            agora_core::AgoraConfig::default()
        }
    };
    if config_path.is_none() {
        tracing::info!("No config file found, using built-in agents");
    }

    let port = port.unwrap_or(config.server.port);
    let state = AppState::new(&config, config_path);
    let app = build_router(state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("WebSocket endpoint: ws://{}/ws", addr);
    tracing::info!("OpenAI-compatible endpoint: http://{}/v1/chat/completions", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
