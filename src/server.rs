use crate::constants::CORS_ALLOWED_HEADERS;
use crate::logging::request_id_middleware;
use crate::AppState;
use axum::{
    http::{HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

fn cors_layer() -> CorsLayer {
    let headers: Vec<HeaderName> = CORS_ALLOWED_HEADERS
        .iter()
        .map(|h| HeaderName::from_static(*h))
        .collect();
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(headers)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/agent-chat", post(crate::relay::agent_chat_handler))
        .route(
            "/store-spend-permission",
            post(crate::permissions::store_permission_handler),
        )
        .route(
            "/check-spend-permission",
            post(crate::permissions::check_permission_handler),
        )
        .route(
            "/create-agent-wallet",
            post(crate::wallet::create_agent_wallet_handler),
        )
        .route("/health", get(crate::health::liveness))
        .route("/readyz", get(crate::health::readiness))
        .route(
            "/admin/chat-history/:address",
            get(crate::health::admin_chat_history),
        )
        .layer(axum::extract::DefaultBodyLimit::max(state.args.max_body_size))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors_layer())
        .with_state(state)
}
