//! Health check handlers and response types.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Run an async check with timeout; returns status string "healthy", "timeout", or "{prefix}: {error}".
async fn run_check<F, E>(timeout: Duration, f: F, error_prefix: &str) -> String
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, f).await {
        Ok(Ok(())) => "healthy".to_string(),
        Ok(Err(e)) => format!("{}: {}", error_prefix, e),
        Err(_) => "timeout".to_string(),
    }
}

#[derive(Serialize, ToSchema)]
pub struct HealthCheckResponse {
    pub status: String,
    /// `postgres` or `erp`
    pub registry_backend: String,
    pub registry: String,
    /// Provisioning runs currently executing.
    pub provisioning_runs: usize,
}

/// Liveness probe - process is running.
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "alive" })),
    )
}

/// Readiness probe - the master registry answers.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match tokio::time::timeout(TIMEOUT, state.registry.ping()).await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ready", "registry": "ready" })),
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Registry readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "not_ready", "registry": "not_ready" })),
            )
        }
        Err(_) => {
            tracing::error!("Registry readiness check timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "not_ready", "registry": "timeout" })),
            )
        }
    }
}

/// Full health check.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Healthy", body = HealthCheckResponse),
        (status = 503, description = "Registry unreachable", body = HealthCheckResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.registry.clone();
    let registry_status =
        run_check(TIMEOUT, async move { registry.ping().await }, "unhealthy").await;
    let healthy = registry_status == "healthy";

    let response = HealthCheckResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        registry_backend: state.registry.backend_name().to_string(),
        registry: registry_status,
        provisioning_runs: state.runner.in_flight(),
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}
