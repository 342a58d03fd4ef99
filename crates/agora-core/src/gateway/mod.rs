//! OpenAI-compatible gateway
//!
//! Serves completion requests straight from the provider adapters, without
//! touching any debate session. Three entry points:
//! - [`Gateway::complete`]: accumulate the whole answer into one response
//! - [`Gateway::stream`]: re-emit adapter chunks as `chat.completion.chunk`
//!   payloads, closed by a stop chunk and `[DONE]`
//! - [`Gateway::raw`]: forward a native request body to the upstream with
//!   credentials injected, relaying the response unmodified

mod types;

pub use types::{
    Choice, CompletionChunk, CompletionRequest, CompletionResponse, Delta, GatewayError,
    GatewaySettings, ModelInfo, Usage, WireMessage, MODEL_CATALOG,
};

use crate::config::{AgoraConfig, ProviderSection};
use crate::llm::{
    create_provider, http_client, AuthStyle, ChatMessage, ChatOptions, LlmError,
    LlmEvent, LlmStream, ProviderConfig, ProviderKind, SharedProvider, ANTHROPIC_VERSION,
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Upper bound on one gateway call
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Payload that closes a streamed completion
pub const DONE_SENTINEL: &str = "[DONE]";

struct GatewayState {
    settings: GatewaySettings,
    providers: HashMap<ProviderKind, ProviderSection>,
}

/// Completion gateway; shared behind an `Arc` by the transport layer
pub struct Gateway {
    state: RwLock<GatewayState>,
    client: reqwest::Client,
    deadline: Duration,
}

/// Upstream response of a raw pass-through call
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: BoxStream<'static, Result<Bytes, LlmError>>,
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// A resolved adapter call, ready to start
struct PreparedCall {
    provider: SharedProvider,
    messages: Vec<ChatMessage>,
    options: ChatOptions,
    model: String,
}

impl Gateway {
    pub fn new(
        settings: GatewaySettings,
        providers: HashMap<ProviderKind, ProviderSection>,
    ) -> Self {
        Self {
            state: RwLock::new(GatewayState {
                settings,
                providers,
            }),
            client: http_client(),
            deadline: REQUEST_DEADLINE,
        }
    }

    pub fn from_config(config: &AgoraConfig) -> Self {
        Self::new(config.gateway.clone(), config.provider_sections())
    }

    /// Shorten the per-call deadline (tests)
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn settings(&self) -> GatewaySettings {
        self.state.read().settings.clone()
    }

    /// Replace the settings; the default provider must be a known kind.
    pub fn update_settings(&self, settings: GatewaySettings) -> Result<(), GatewayError> {
        settings
            .default_provider
            .parse::<ProviderKind>()
            .map_err(|e| GatewayError::invalid_request(e.to_string()))?;
        tracing::info!(
            "Gateway settings updated: default_provider={}, logging={}",
            settings.default_provider,
            settings.enable_logging
        );
        self.state.write().settings = settings;
        Ok(())
    }

    /// Swap settings and credentials after a config reload
    pub fn reload(&self, config: &AgoraConfig) {
        let mut state = self.state.write();
        state.settings = config.gateway.clone();
        state.providers = config.provider_sections();
    }

    /// Provider kind for an explicit selector, or the configured default
    fn select_kind(&self, selector: Option<&str>) -> Result<ProviderKind, GatewayError> {
        let selector = match selector.map(str::trim).filter(|s| !s.is_empty()) {
            Some(selector) => selector.to_string(),
            None => self.state.read().settings.default_provider.clone(),
        };
        selector
            .parse()
            .map_err(|e: LlmError| GatewayError::invalid_request(e.to_string()))
    }

    fn provider_config(&self, kind: ProviderKind, model: &str) -> ProviderConfig {
        let state = self.state.read();
        let section = state.providers.get(&kind).cloned().unwrap_or_default();
        drop(state);

        let mut config = ProviderConfig::new(kind).with_api_key(section.api_key);
        if !section.base_url.is_empty() {
            config = config.with_base_url(section.base_url);
        }
        let model = if model.trim().is_empty() {
            section.model
        } else {
            model.to_string()
        };
        if !model.is_empty() {
            config = config.with_model(model);
        }
        config
    }

    /// Resolve credentials and endpoint for a completion call.
    ///
    /// Unknown provider: 400. Missing key for a provider that needs one: 401.
    pub fn resolve(
        &self,
        provider: Option<&str>,
        model: &str,
    ) -> Result<ProviderConfig, GatewayError> {
        let kind = self.select_kind(provider)?;
        let config = self.provider_config(kind, model);
        if config.api_key.is_empty() && kind.requires_api_key() {
            return Err(GatewayError::authentication(format!(
                "No API key configured for provider: {}",
                kind
            )));
        }
        Ok(config)
    }

    fn prepare(&self, req: &CompletionRequest) -> Result<PreparedCall, GatewayError> {
        if self.state.read().settings.enable_logging {
            tracing::info!(
                "Gateway request: model={}, provider={}, stream={}, messages={}",
                req.model,
                req.provider.as_deref().unwrap_or("default"),
                req.stream,
                req.messages.len()
            );
        }

        let config = self.resolve(req.provider.as_deref(), &req.model)?;
        let provider = create_provider(&config)
            .map_err(|e| GatewayError::invalid_request(e.to_string()))?;

        let options = ChatOptions {
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            ..Default::default()
        };

        Ok(PreparedCall {
            model: provider.model(),
            provider,
            messages: req.messages.iter().map(ChatMessage::from).collect(),
            options,
        })
    }

    /// Token that fires after the deadline or when the guard drops
    fn deadline_token(&self) -> (CancellationToken, DropGuard) {
        let token = CancellationToken::new();
        let timer = token.clone();
        let deadline = self.deadline;
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    tracing::warn!("Gateway call exceeded {:?}, cancelling", deadline);
                    timer.cancel();
                }
            }
        });
        let guard = token.clone().drop_guard();
        (token, guard)
    }

    /// Non-streaming completion
    pub async fn complete(
        &self,
        req: CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        let call = self.prepare(&req)?;
        let (cancel, _guard) = self.deadline_token();
        let events = call.provider.chat(call.messages, &call.options, cancel);
        let content = collect_text(events).await?;

        Ok(CompletionResponse {
            id: completion_id(),
            object: "chat.completion".to_string(),
            created: Utc::now().timestamp(),
            model: call.model,
            choices: vec![Choice {
                index: 0,
                message: Some(WireMessage {
                    role: "assistant".to_string(),
                    content: content.clone(),
                }),
                delta: None,
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage::estimate(req.messages.len(), &content),
        })
    }

    /// Streaming completion. Yields SSE `data:` payloads; the transport adds
    /// the framing. Failures after this returns arrive as an error payload.
    pub fn stream(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, String>, GatewayError> {
        let call = self.prepare(&req)?;
        let (cancel, guard) = self.deadline_token();
        let events = call.provider.chat(call.messages, &call.options, cancel);
        Ok(completion_frames(
            events,
            completion_id(),
            Utc::now().timestamp(),
            call.model,
            Some(guard),
        ))
    }

    /// Native endpoint for `config`
    fn raw_target(config: &ProviderConfig) -> String {
        let base = config.base_url();
        match config.kind {
            ProviderKind::Anthropic => format!("{}/v1/messages", base),
            ProviderKind::Gemini => format!(
                "{}/v1beta/models/{}:generateContent",
                base,
                config.model()
            ),
            ProviderKind::Ollama => format!("{}/api/chat", base),
            _ => format!("{}/chat/completions", base),
        }
    }

    /// Forward `body` verbatim to the provider's native endpoint.
    pub async fn raw(
        &self,
        provider: Option<&str>,
        body: Bytes,
    ) -> Result<RawResponse, GatewayError> {
        let kind = self.select_kind(provider)?;
        let config = self.provider_config(kind, "");
        let url = Self::raw_target(&config);

        if self.state.read().settings.enable_logging {
            tracing::info!("Raw proxy request to {} ({} bytes)", url, body.len());
        }

        let mut request = self
            .client
            .post(&url)
            .timeout(self.deadline)
            .header("content-type", "application/json")
            .body(body);
        if !config.api_key.is_empty() {
            request = match kind.auth_style() {
                AuthStyle::Bearer => request.bearer_auth(&config.api_key),
                AuthStyle::ApiKeyHeader => request
                    .header("x-api-key", &config.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION),
                AuthStyle::QueryParam => request.query(&[("key", &config.api_key)]),
                AuthStyle::None => request,
            };
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!("Raw proxy to {} failed: {}", kind, e);
            GatewayError::api(502, e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let is_sse = headers
            .iter()
            .any(|(name, value)| name == "content-type" && value.contains("text/event-stream"));

        let upstream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::Stream(e.to_string())))
            .boxed();
        let body = if is_sse {
            relay_lines(upstream)
        } else {
            upstream
        };

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn completion_id() -> String {
    format!(
        "chatcmpl-{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

fn to_payload<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize gateway frame: {}", e);
        String::new()
    })
}

/// Drain an adapter stream into the full answer
async fn collect_text(mut events: LlmStream) -> Result<String, GatewayError> {
    let mut content = String::new();
    while let Some(event) = events.recv().await {
        match event {
            LlmEvent::Chunk(text) => content.push_str(&text),
            LlmEvent::Done => break,
            LlmEvent::Cancelled => {
                return Err(GatewayError::api(504, "Upstream request timed out"))
            }
            LlmEvent::Error(e) => return Err(GatewayError::api(500, e.to_string())),
        }
    }
    Ok(content)
}

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    Streaming,
    Closing,
    Finished,
}

struct FrameState {
    events: LlmStream,
    id: String,
    created: i64,
    model: String,
    phase: Phase,
    /// Cancels the upstream call when the client goes away
    _guard: Option<DropGuard>,
}

/// Translate adapter events into completion-chunk payloads
fn completion_frames(
    events: LlmStream,
    id: String,
    created: i64,
    model: String,
    guard: Option<DropGuard>,
) -> BoxStream<'static, String> {
    let state = FrameState {
        events,
        id,
        created,
        model,
        phase: Phase::Streaming,
        _guard: guard,
    };

    stream::unfold(state, |mut s| async move {
        match s.phase {
            Phase::Finished => return None,
            Phase::Closing => {
                s.phase = Phase::Finished;
                return Some((DONE_SENTINEL.to_string(), s));
            }
            Phase::Streaming => {}
        }

        loop {
            let payload = match s.events.recv().await {
                Some(LlmEvent::Chunk(text)) if text.is_empty() => continue,
                Some(LlmEvent::Chunk(text)) => {
                    to_payload(&CompletionChunk::content(&s.id, s.created, &s.model, text))
                }
                Some(LlmEvent::Done) | None => {
                    s.phase = Phase::Closing;
                    to_payload(&CompletionChunk::stop(&s.id, s.created, &s.model))
                }
                Some(LlmEvent::Cancelled) => {
                    s.phase = Phase::Finished;
                    types::error_body("Upstream request timed out", "api_error").to_string()
                }
                Some(LlmEvent::Error(e)) => {
                    s.phase = Phase::Finished;
                    types::error_body(&e.to_string(), "api_error").to_string()
                }
            };
            return Some((payload, s));
        }
    })
    .boxed()
}

/// Re-chunk an SSE body so every relayed piece ends on a line boundary.
/// Bytes pass through untouched; only the chunk boundaries move.
fn relay_lines(
    upstream: BoxStream<'static, Result<Bytes, LlmError>>,
) -> BoxStream<'static, Result<Bytes, LlmError>> {
    stream::unfold(
        (upstream, BytesMut::new(), false),
        |(mut upstream, mut pending, done)| async move {
            if done {
                return None;
            }
            loop {
                match upstream.next().await {
                    Some(Ok(bytes)) => {
                        pending.extend_from_slice(&bytes);
                        let Some(last) = pending.iter().rposition(|b| *b == b'\n') else {
                            continue;
                        };
                        let complete = pending.split_to(last + 1).freeze();
                        return Some((Ok(complete), (upstream, pending, false)));
                    }
                    Some(Err(e)) => return Some((Err(e), (upstream, pending, true))),
                    None if pending.is_empty() => return None,
                    None => {
                        let rest = pending.split().freeze();
                        return Some((Ok(rest), (upstream, pending, true)));
                    }
                }
            }
        },
    )
    .boxed()
}
