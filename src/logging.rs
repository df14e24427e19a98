use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};
use std::panic;
use tracing::{error, info, info_span, Instrument, Span};
use tracing_appender::non_blocking::WorkerGuard;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Where log output goes. `serve` mirrors to stdout; `chat` keeps the
/// terminal clean and only writes files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    StdoutAndFiles,
    FilesOnly,
}

/// Installs the global subscriber: env filter, plain-text daily log file,
/// redacted NDJSON trace file and the span-trace error layer. The returned
/// guards must live until shutdown or buffered lines are lost.
pub fn init_tracing(log_dir: &str, target: LogTarget) -> Vec<WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => "base_agent=debug,tower_http=info".into(),
    };

    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, "base-agent.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let trace_appender = tracing_appender::rolling::daily(log_dir, "trace_buffer.json");
    let (trace_writer, trace_guard) = tracing_appender::non_blocking(trace_appender);

    let stdout_layer = match target {
        LogTarget::StdoutAndFiles => Some(tracing_subscriber::fmt::layer().with_target(false)),
        LogTarget::FilesOnly => None,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .with(crate::ndjson_layer::NdjsonLayer::new(
            crate::redaction_layer::RedactingWriter::new(trace_writer),
        ))
        .with(tracing_error::ErrorLayer::default())
        .try_init();

    vec![file_guard, trace_guard]
}

/// Sets up a global panic hook that logs panics using tracing.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            target: "panic",
            message = %message,
            location = %location,
            backtrace = %backtrace,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4().to_string();
    if let Ok(val) = request_id.parse() {
        req.headers_mut().insert(REQUEST_ID_HEADER, val);
    }

    let span = info_span!(
        "request",
        request_id = %crate::str_utils::prefix_chars(&request_id, 8),
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut response = next.run(req).instrument(span).await;
    if let Ok(val) = request_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    response
}

/// Counts what the relay pipes downstream. Logs a summary when dropped, which
/// happens when the response body finishes or the caller disconnects.
pub struct PipeMetric {
    pub chunks: usize,
    pub bytes: usize,
    span: Span,
    started: std::time::Instant,
}

impl PipeMetric {
    pub fn new(span: Span) -> Self {
        Self {
            chunks: 0,
            bytes: 0,
            span,
            started: std::time::Instant::now(),
        }
    }

    pub fn record_chunk(&mut self, len: usize) {
        self.chunks += 1;
        self.bytes += len;
    }
}

impl Drop for PipeMetric {
    fn drop(&mut self) {
        let _enter = self.span.enter();
        info!(
            chunks = self.chunks as u64,
            bytes = self.bytes as u64,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "[☁️  -> 📱] Stream closed"
        );
    }
}
