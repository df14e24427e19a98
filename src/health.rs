use crate::types::UserAddress;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub database: String,
    pub gateway_key: String,
    pub upstream: serde_json::Value,
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "ok" })
}

pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let mut db_ok = true;
    if let Err(e) = sqlx::query("SELECT 1").fetch_one(&state.db).await {
        tracing::error!("Readiness check: DB error: {}", e);
        db_ok = false;
    }

    let key_ok = state.credentials.gateway_api_key.is_some();
    if !key_ok {
        tracing::error!("Readiness check: gateway key missing");
    }

    let ready = db_ok && key_ok;
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "unready" }.to_string(),
            database: if db_ok { "ok" } else { "error" }.to_string(),
            gateway_key: if key_ok { "ok" } else { "missing" }.to_string(),
            upstream: state.health.snapshot(),
        }),
    )
}

/// Stored chat history for one address. Loopback callers only.
pub async fn admin_chat_history(
    State(state): State<Arc<AppState>>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Path(address): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let ip = addr.ip();
    if !ip.is_loopback() {
        tracing::warn!("Blocked admin access attempt from {}", ip);
        return (StatusCode::FORBIDDEN, Json(serde_json::json!({ "error": "Unauthorized" })));
    }

    let user = UserAddress(address);
    let rows = match crate::db::get_chat_history(&state.db, &user).await {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("DB Error: {}", e.inner) })),
            );
        }
    };

    if rows.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "No chat history for address" })),
        );
    }

    let messages: Vec<_> = rows
        .into_iter()
        .map(|(role, content)| serde_json::json!({ "role": role, "content": content }))
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "user_address": user.0,
            "message_count": messages.len(),
            "messages": messages,
        })),
    )
}
