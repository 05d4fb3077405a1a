use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

/// Header name for trace ID.
pub const TRACE_ID_HEADER: &str = "x-trace-id";
/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request tracing state, stored in request extensions.
#[derive(Debug, Clone)]
pub struct TracingState {
    pub trace_id: String,
    pub request_id: String,
    pub start_time: std::time::Instant,
}

impl TracingState {
    pub fn new() -> Self {
        Self::with_trace_id(Uuid::new_v4().to_string())
    }

    /// Create with an existing trace ID (for propagation).
    pub fn with_trace_id(trace_id: String) -> Self {
        Self {
            trace_id,
            request_id: Uuid::new_v4().to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for TracingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach trace and request IDs to the request and echo them on the response.
pub async fn tracing_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get(HeaderName::from_static(TRACE_ID_HEADER))
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let state = TracingState::with_trace_id(trace_id);
    req.extensions_mut().insert(state.clone());

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let mut response = next.run(req).await;

    tracing::debug!(
        trace_id = %state.trace_id,
        request_id = %state.request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = state.elapsed().as_millis() as u64,
        "Request handled"
    );

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&state.trace_id) {
        headers.insert(HeaderName::from_static(TRACE_ID_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(&state.request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
