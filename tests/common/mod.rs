#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use base_agent::{AppState, Credentials, ServeArgs};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const TEST_KEY: &str = "test-gateway-key";

/// How a successful fake stream ends after its chunks are sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamTail {
    /// The body closes normally.
    End,
    /// The body stays open and never sends again.
    Stall,
    /// The body fails, so the client sees a broken transfer.
    Break,
}

/// What the fake gateway answers and what it saw.
#[derive(Clone)]
pub struct MockUpstream {
    pub status: StatusCode,
    pub body: Vec<String>,
    pub tail: StreamTail,
    pub received: Arc<Mutex<Vec<serde_json::Value>>>,
    pub auth: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    pub fn new(status: StatusCode, body: Vec<String>) -> Self {
        Self {
            status,
            body,
            tail: StreamTail::End,
            received: Arc::new(Mutex::new(Vec::new())),
            auth: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_tail(mut self, tail: StreamTail) -> Self {
        self.tail = tail;
        self
    }

    pub fn hits(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

async fn mock_completions(
    State(mock): State<MockUpstream>,
    headers: axum::http::HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    mock.received.lock().unwrap().push(body);
    if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        mock.auth.lock().unwrap().push(v.to_string());
    }
    if !mock.status.is_success() {
        return (mock.status, mock.body.concat()).into_response();
    }
    let chunks = futures_util::stream::iter(
        mock.body
            .clone()
            .into_iter()
            .map(|c| Ok::<_, std::io::Error>(bytes::Bytes::from(c))),
    );
    let stream: BoxStream<'static, std::io::Result<bytes::Bytes>> = match mock.tail {
        StreamTail::End => chunks.boxed(),
        StreamTail::Stall => chunks.chain(stream::pending()).boxed(),
        StreamTail::Break => chunks
            .chain(stream::once(async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Err(std::io::Error::other("upstream cut off"))
            }))
            .boxed(),
    };
    (
        StatusCode::OK,
        [("content-type", "text/event-stream")],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Serves `router` on an ephemeral loopback port and returns its base URL.
pub async fn spawn_router(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{}", addr)
}

/// Starts the fake gateway and returns its chat-completions URL.
pub async fn spawn_upstream(mock: MockUpstream) -> String {
    let router = Router::new()
        .route("/v1/chat/completions", post(mock_completions))
        .with_state(mock);
    format!("{}/v1/chat/completions", spawn_router(router).await)
}

pub fn credentials(with_key: bool) -> Credentials {
    Credentials {
        gateway_api_key: with_key.then(|| TEST_KEY.to_string()),
        cdp: None,
    }
}

/// App state over a fresh migrated database in a temp dir. Keep the
/// `TempDir` alive for the duration of the test.
pub async fn test_state(gateway_url: &str, credentials: Credentials) -> (Arc<AppState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = base_agent::db::init_db(dir.path().join("test.db")).await.unwrap();
    let args = ServeArgs {
        gateway_url: gateway_url.to_string(),
        database: dir.path().join("test.db").display().to_string(),
        log_dir: dir.path().join("logs").display().to_string(),
        ..ServeArgs::default()
    };
    let state = Arc::new(AppState::new(reqwest::Client::new(), credentials, db, args));
    (state, dir)
}

pub fn sse_frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
    )
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
