//! Credential report-back and rotation handlers

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use nexus_core::models::{
    ApiCredentials, TenantStatus, TenantUpsert, UpdateCredentialsRequest,
    UpdateCredentialsResponse,
};
use nexus_core::validation::validate_subdomain;
use nexus_core::AppError;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Idempotent upsert used by provisioning pipelines to report a tenant's credentials.
///
/// Creates the record when missing (`active` when a site URL is reported, else `pending`);
/// otherwise updates it. A reported site URL also promotes a `pending` record to `active`.
#[utoipa::path(
    post,
    path = "/tenant/update-credentials",
    tag = "tenants",
    request_body = UpdateCredentialsRequest,
    responses(
        (status = 200, description = "Record created or updated", body = UpdateCredentialsResponse),
        (status = 400, description = "Invalid tenant name or fields", body = ErrorResponse),
        (status = 503, description = "Registry unavailable; retry", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(tenant = %request.tenant_name))]
pub async fn update_credentials(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<UpdateCredentialsRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let subdomain = request.tenant_name.trim().to_lowercase();
    validate_subdomain(&subdomain).map_err(AppError::InvalidName)?;

    let promote = request.site_url.is_some()
        && state
            .registry
            .get_by_subdomain(&subdomain)
            .await?
            .is_some_and(|t| t.status == TenantStatus::Pending);

    let upsert = TenantUpsert {
        owner_email: request.owner_email,
        status: promote.then_some(TenantStatus::Active),
        site_url: request.site_url,
        credentials: Some(ApiCredentials {
            api_key: request.api_key,
            api_secret: request.api_secret,
        }),
        ..Default::default()
    };
    let (tenant, action) = state.registry.upsert_tenant(&subdomain, upsert).await?;
    tracing::info!(subdomain = %tenant.subdomain, ?action, status = %tenant.status, "Credentials recorded");

    Ok(Json(UpdateCredentialsResponse {
        success: true,
        action,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RotateCredentialsResponse {
    pub success: bool,
    pub subdomain: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Issue a new API pair for a live tenant, replacing the old one on the site and in the registry.
#[utoipa::path(
    post,
    path = "/tenants/{subdomain}/rotate-credentials",
    tag = "tenants",
    params(("subdomain" = String, Path, description = "Tenant subdomain")),
    responses(
        (status = 200, description = "New credential pair", body = RotateCredentialsResponse),
        (status = 207, description = "Site holds the new pair but the registry does not; the body carries it", body = crate::error::DegradedResponse),
        (status = 400, description = "Tenant has no credentials", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse),
        (status = 503, description = "Registry write failed; the site was rolled back to the current pair", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn rotate_credentials(
    State(state): State<Arc<AppState>>,
    Path(subdomain): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let ApiCredentials {
        api_key,
        api_secret,
    } = state.provisioner().rotate(&subdomain).await?;
    Ok(Json(RotateCredentialsResponse {
        success: true,
        subdomain,
        api_key,
        api_secret,
    }))
}
