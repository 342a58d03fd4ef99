//! OpenAI-compatible gateway routes

use agora_core::gateway::{CompletionRequest, GatewayError, GatewaySettings, MODEL_CATALOG};
use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;

use crate::state::AppState;

/// Gateway error rendered OpenAI-style
pub struct GatewayFailure(GatewayError);

impl From<GatewayError> for GatewayFailure {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for GatewayFailure {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body())).into_response()
    }
}

fn invalid_body(rejection: JsonRejection) -> GatewayFailure {
    tracing::debug!("Rejected gateway body: {}", rejection);
    GatewayError::invalid_request("Invalid request body").into()
}

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    State(state): State<AppState>,
    body: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Response, GatewayFailure> {
    let Json(req) = body.map_err(invalid_body)?;

    if req.stream {
        let frames = state.gateway.stream(req)?;
        let events = frames.map(|data| Ok::<_, Infallible>(Event::default().data(data)));
        return Ok(Sse::new(events).into_response());
    }

    let response = state.gateway.complete(req).await?;
    Ok(Json(response).into_response())
}

/// `GET /v1/models`
pub async fn list_models() -> impl IntoResponse {
    Json(serde_json::json!({
        "object": "list",
        "data": MODEL_CATALOG
    }))
}

#[derive(Deserialize)]
pub struct ProxyQuery {
    provider: Option<String>,
}

/// `POST /v1/proxy?provider=` - native request body, forwarded as-is
pub async fn raw_proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    body: Bytes,
) -> Result<Response, GatewayFailure> {
    let upstream = state.gateway.raw(query.provider.as_deref(), body).await?;

    let mut response = Response::new(Body::from_stream(upstream.body));
    *response.status_mut() =
        StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let headers = response.headers_mut();
    for (name, value) in upstream.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.append(name, value);
        }
    }
    Ok(response)
}

/// `GET /api/settings/proxy`
pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.settings())
}

/// `POST /api/settings/proxy`
pub async fn update_settings(
    State(state): State<AppState>,
    body: Result<Json<GatewaySettings>, JsonRejection>,
) -> Result<Json<GatewaySettings>, GatewayFailure> {
    let Json(settings) = body.map_err(|rejection| {
        tracing::debug!("Rejected settings body: {}", rejection);
        GatewayFailure(GatewayError::invalid_request("Invalid config"))
    })?;
    state.gateway.update_settings(settings)?;
    Ok(Json(state.gateway.settings()))
}
