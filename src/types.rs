use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing_error::SpanTrace;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

/// One turn of a conversation as it travels between client, relay and upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Wallet address of the caller. Used as the key for chat history and permissions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserAddress(pub String);

impl From<String> for UserAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl UserAddress {
    pub fn short(&self) -> &str {
        crate::str_utils::prefix_chars(&self.0, 10)
    }

    pub fn normalized(&self) -> String {
        self.0.trim().to_lowercase()
    }
}

impl fmt::Display for UserAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct UpstreamHealth {
    pub consecutive_failures: AtomicU32,
    pub total_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub last_success: std::sync::RwLock<Option<Instant>>,
    pub last_failure: std::sync::RwLock<Option<Instant>>,
}

impl Default for UpstreamHealth {
    fn default() -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            last_success: std::sync::RwLock::new(None),
            last_failure: std::sync::RwLock::new(None),
        }
    }
}

impl UpstreamHealth {
    pub fn record_success(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if let Ok(mut last) = self.last_success.write() {
            *last = Some(Instant::now());
        }
    }

    pub fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_failure.write() {
            *last = Some(Instant::now());
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "total_requests": self.total_requests.load(Ordering::Relaxed),
            "failed_requests": self.failed_requests.load(Ordering::Relaxed),
            "consecutive_failures": self.consecutive_failures.load(Ordering::Relaxed),
        })
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{0}")]
    Configuration(String),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("AI credits exhausted. Please add credits.")]
    CreditsExhausted,

    #[error("AI gateway error: {}", .0.as_u16())]
    UpstreamFailure(axum::http::StatusCode),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    InvalidIngress(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AgentError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AgentError::CreditsExhausted => StatusCode::PAYMENT_REQUIRED,
            AgentError::InvalidIngress(_) => StatusCode::BAD_REQUEST,
            AgentError::Configuration(_)
            | AgentError::UpstreamFailure(_)
            | AgentError::Database(_)
            | AgentError::Serialization(_)
            | AgentError::Network(_)
            | AgentError::Io(_)
            | AgentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Configuration(_) => "CONFIGURATION_ERROR",
            AgentError::RateLimited => "RATE_LIMITED",
            AgentError::CreditsExhausted => "CREDITS_EXHAUSTED",
            AgentError::UpstreamFailure(_) => "UPSTREAM_FAILURE",
            AgentError::Database(_) => "DATABASE_ERROR",
            AgentError::Serialization(_) => "SERIALIZATION_ERROR",
            AgentError::Network(_) => "NETWORK_ERROR",
            AgentError::Io(_) => "IO_ERROR",
            AgentError::InvalidIngress(_) => "INVALID_INGRESS",
            AgentError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for AgentError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AgentError::InvalidIngress(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl axum::response::IntoResponse for ObservedError {
    fn into_response(self) -> axum::response::Response {
        (
            self.inner.status(),
            axum::Json(serde_json::json!({
                "error": self.inner.to_string(),
                "code": self.inner.code(),
            })),
        )
            .into_response()
    }
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: AgentError,
    pub span_trace: SpanTrace,
}

impl std::fmt::Display for ObservedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n\nSpan Trace:\n{}", self.inner, self.span_trace)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<AgentError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(AgentError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AgentError::CreditsExhausted.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            AgentError::UpstreamFailure(StatusCode::BAD_GATEWAY).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AgentError::Configuration("missing".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_failure_message_names_status() {
        let err = AgentError::UpstreamFailure(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "AI gateway error: 503");
    }

    #[test]
    fn test_role_wire_format() {
        let msg = ConversationMessage::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        let back: ConversationMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"yo"}"#).unwrap();
        assert_eq!(back, ConversationMessage::assistant("yo"));
    }
}
