//! Tenant lookup and lifecycle handlers

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use nexus_core::models::{ResolvedTenant, StatusChangeRequest, Tenant};
use nexus_core::AppError;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ByEmailQuery {
    /// Owner email address
    pub email: Option<String>,
}

/// Look up an owner's existing workspace. A registry outage answers `degraded: true`.
#[utoipa::path(
    get,
    path = "/tenants/by-email",
    tag = "tenants",
    params(ByEmailQuery),
    responses(
        (status = 200, description = "Resolution result", body = ResolvedTenant),
        (status = 400, description = "Missing email", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, query))]
pub async fn get_tenant_by_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ByEmailQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let email = query
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("email query parameter is required".to_string()))?;
    Ok(Json(state.resolver.resolve_by_email(email).await))
}

/// Registry record of one tenant. Secrets are never included.
#[utoipa::path(
    get,
    path = "/tenants/{subdomain}",
    tag = "tenants",
    params(("subdomain" = String, Path, description = "Tenant subdomain")),
    responses(
        (status = 200, description = "Tenant record", body = Tenant),
        (status = 404, description = "Tenant not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_tenant(
    State(state): State<Arc<AppState>>,
    Path(subdomain): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let tenant = state
        .registry
        .get_by_subdomain(&subdomain)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tenant '{}' not found", subdomain)))?;
    Ok(Json(tenant))
}

/// Lifecycle change from a trusted collaborator (billing). Backward moves are rejected.
#[utoipa::path(
    post,
    path = "/tenants/{subdomain}/status",
    tag = "tenants",
    params(("subdomain" = String, Path, description = "Tenant subdomain")),
    request_body = StatusChangeRequest,
    responses(
        (status = 200, description = "Updated tenant record", body = Tenant),
        (status = 404, description = "Tenant not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(status = %request.status))]
pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(subdomain): Path<String>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let tenant = state.registry.set_status(&subdomain, request.status).await?;
    tracing::info!(subdomain = %tenant.subdomain, status = %tenant.status, "Tenant status changed");
    Ok(Json(tenant))
}
