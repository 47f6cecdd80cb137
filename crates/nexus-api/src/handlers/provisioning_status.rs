//! Provisioning status handler (the cheap read pollers hit)

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use nexus_core::models::StatusReport;
use nexus_core::AppError;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatusQuery {
    /// Tenant subdomain
    pub tenant: Option<String>,
}

/// Readiness of a tenant's workspace.
#[utoipa::path(
    get,
    path = "/provisioning-status",
    tag = "provisioning",
    params(StatusQuery),
    responses(
        (status = 200, description = "Current status", body = StatusReport),
        (status = 400, description = "Missing tenant parameter", body = ErrorResponse),
        (status = 503, description = "Registry unavailable; keep polling", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn provisioning_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let tenant = query
        .tenant
        .as_deref()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("tenant query parameter is required".to_string()))?;

    let report = state.status.check_status(&tenant).await?;
    Ok(Json(report))
}
