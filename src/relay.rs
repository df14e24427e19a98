//! Chat relay: forwards a conversation to the AI gateway and pipes the event
//! stream back untouched.

use crate::constants::{EVENT_STREAM_CONTENT_TYPE, SYSTEM_PROMPT};
use crate::ingress::{json_body, ChatRequest};
use crate::logging::PipeMetric;
use crate::specs::openai::OpenAiRequest;
use crate::tool_schema::{agent_tools, required_params};
use crate::types::*;
use crate::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// Builds the upstream request: system prompt first, then the caller's turns
/// in order, with the agent tools attached and streaming requested.
pub fn build_upstream_request(model: &str, messages: &[ConversationMessage]) -> OpenAiRequest {
    let mut outgoing = Vec::with_capacity(messages.len() + 1);
    outgoing.push(ConversationMessage::system(SYSTEM_PROMPT));
    outgoing.extend(messages.iter().cloned());

    OpenAiRequest {
        model: model.to_string(),
        messages: outgoing,
        tools: Some(agent_tools()),
        tool_choice: Some(serde_json::json!("auto")),
        stream: Some(true),
        extra: HashMap::new(),
    }
}

/// Maps a non-success upstream status onto the relay's error taxonomy.
pub fn classify_upstream_status(status: StatusCode) -> AgentError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited,
        StatusCode::PAYMENT_REQUIRED => AgentError::CreditsExhausted,
        other => AgentError::UpstreamFailure(other),
    }
}

/// Records the trailing user turn off the response path. Failures are logged
/// and never reach the caller.
fn spawn_history_write(state: &Arc<AppState>, request: &ChatRequest) {
    let Some(message) = request.trailing_user_message().cloned() else {
        return;
    };
    let db = state.db.clone();
    let user = request.user_address.clone();
    let span = tracing::Span::current();

    tokio::spawn(
        async move {
            if let Err(e) = crate::db::insert_chat_message(&db, &user, &message).await {
                tracing::warn!(
                    "[⚙️  -> 🗄️ ] Failed to store chat message for {}...: {}",
                    user.short(),
                    e.inner
                );
            }
        }
        .instrument(span),
    );
}

#[tracing::instrument(
    name = "relay.chat",
    skip_all,
    fields(
        user = tracing::field::Empty,
        messages = tracing::field::Empty,
        http.status = tracing::field::Empty,
        relay.outcome = tracing::field::Empty,
    )
)]
pub async fn agent_chat_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let span = tracing::Span::current();

    let request = match json_body(payload).and_then(ChatRequest::from_value) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("[📱 -> ⚙️ ] Validation Failed: {}", e.inner);
            span.record("relay.outcome", "client_error");
            return e.into_response();
        }
    };
    span.record("user", request.user_address.short());
    span.record("messages", request.messages.len());

    match relay_chat(&state, &request).await {
        Ok(response) => {
            span.record("relay.outcome", "streaming");
            response
        }
        Err(e) => {
            span.record("http.status", e.inner.status().as_u16());
            span.record("relay.outcome", e.inner.code());
            tracing::error!("[⚙️  -> 📱] Agent chat error: {}", e.inner);
            e.into_response()
        }
    }
}

/// Runs one relay exchange. Returns the streaming response on upstream
/// success; every failure is surfaced once, with no retry.
pub async fn relay_chat(state: &Arc<AppState>, request: &ChatRequest) -> Result<Response> {
    let api_key = state.credentials.gateway_key()?;

    spawn_history_write(state, request);

    let outgoing = build_upstream_request(&state.args.model, &request.messages);
    if let Some(tools) = outgoing.tools.as_ref() {
        for tool in tools {
            tracing::debug!(
                "Advertising tool {} (required: {:?})",
                tool.function.name,
                required_params(tool)
            );
        }
    }
    tracing::info!(
        "[⚙️  -> ☁️ ] Forwarding {} messages to {}",
        outgoing.messages.len(),
        state.args.model
    );

    let upstream = match state
        .client
        .post(&state.args.gateway_url)
        .bearer_auth(api_key)
        .json(&outgoing)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            state.health.record_failure();
            return Err(AgentError::Network(e).into());
        }
    };

    let status = upstream.status();
    tracing::info!("[☁️  -> ⚙️ ] Status: {}", status);

    if !status.is_success() {
        state.health.record_failure();
        let error_body = match upstream.text().await {
            Ok(text) => text,
            Err(e) => format!("(body unreadable: {})", e),
        };
        tracing::error!(
            "[☁️  -> ⚙️ ] AI gateway error: {} {}",
            status,
            crate::str_utils::prefix_chars(&error_body, 500)
        );
        return Err(classify_upstream_status(status).into());
    }

    state.health.record_success();
    Ok(pipe_event_stream(upstream))
}

/// Wraps the upstream body as the response body without buffering or
/// touching the bytes.
fn pipe_event_stream(upstream: reqwest::Response) -> Response {
    let mut metric = PipeMetric::new(tracing::Span::current());
    let body = upstream.bytes_stream().map(move |chunk| {
        if let Ok(bytes) = &chunk {
            metric.record_chunk(bytes.len());
        }
        chunk
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
