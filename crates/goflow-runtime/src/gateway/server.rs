use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use goflow_core::config::GatewayConfig;
use goflow_core::workflow::InboundEvent;

use super::response::{ApiError, ApiResponse};
use super::tracing::{tracing_middleware, TracingState};
use crate::db::Database;
use crate::workflow::{EventIngress, WorkflowExecutor};

/// Shared state for gateway handlers.
pub struct GatewayState {
    pub ingress: Arc<EventIngress>,
    pub executor: Arc<WorkflowExecutor>,
    pub db: Database,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelParams {
    pub reason: Option<String>,
}

/// HTTP front door: event intake and run inspection.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<GatewayState>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, state: GatewayState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Build the Axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/events", post(admit_handler))
            .route("/runs/{run_id}", get(inspect_handler))
            .route("/runs/{run_id}/cancel", post(cancel_handler))
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        self.config.request_timeout_secs,
                    )))
                    .layer(middleware::from_fn(tracing_middleware)),
            )
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Serve until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        let addr = self.addr();
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Gateway listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> Response {
    let version = env!("CARGO_PKG_VERSION").to_string();
    match state.db.health_check().await {
        Ok(()) => Json(HealthResponse {
            status: "healthy".to_string(),
            version,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    version,
                }),
            )
                .into_response()
        }
    }
}

async fn admit_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(trace): Extension<TracingState>,
    Json(event): Json<InboundEvent>,
) -> Result<(StatusCode, ApiResponse), ApiError> {
    let admission = state.ingress.admit(event).await?;
    let status = if admission.created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    let data = serde_json::to_value(&admission).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok((
        status,
        ApiResponse::success(data).with_request_id(trace.request_id),
    ))
}

async fn inspect_handler(
    State(state): State<Arc<GatewayState>>,
    Path(run_id): Path<Uuid>,
) -> Result<ApiResponse, ApiError> {
    let report = state.executor.inspect(run_id).await?;
    let data = serde_json::to_value(&report).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(ApiResponse::success(data))
}

async fn cancel_handler(
    State(state): State<Arc<GatewayState>>,
    Path(run_id): Path<Uuid>,
    Query(params): Query<CancelParams>,
) -> Result<ApiResponse, ApiError> {
    let reason = params.reason.unwrap_or_else(|| "cancelled by operator".to_string());
    let cancelled = state.executor.cancel(run_id, &reason).await?;
    Ok(ApiResponse::success(serde_json::json!({
        "runId": run_id,
        "cancelled": cancelled,
    })))
}
