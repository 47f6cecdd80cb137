//! Provisioning handlers
//!
//! `POST /tenants/provision` runs the provisioner on the background runner. With
//! `background: true` it answers 202 right after the fail-fast checks; otherwise it waits
//! up to the sync timeout and answers 200, 207 (site up, bookkeeping incomplete) or an error.

use crate::constants::PROVISIONING_STATUS_PATH;
use crate::error::{DegradedResponse, ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use nexus_core::models::{
    Plan, ProvisionRequest, ProvisionStep, ProvisionedTenant, TenantStatus,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProvisionResponse {
    pub success: bool,
    pub subdomain: String,
    pub site_name: String,
    pub site_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub admin_password: String,
    pub plan: Plan,
    pub status: TenantStatus,
    pub steps_completed: Vec<ProvisionStep>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<ProvisionedTenant> for ProvisionResponse {
    fn from(tenant: ProvisionedTenant) -> Self {
        Self {
            success: true,
            subdomain: tenant.subdomain,
            site_name: tenant.site_name,
            site_url: tenant.site_url,
            api_key: tenant.api_key,
            api_secret: tenant.api_secret,
            admin_password: tenant.admin_password,
            plan: tenant.plan,
            status: tenant.status,
            steps_completed: tenant.steps_completed,
            warnings: tenant.warnings,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProvisionAccepted {
    pub accepted: bool,
    pub subdomain: String,
    /// Poll this until `ready` is true.
    pub status_url: String,
}

/// Provision a new tenant site.
#[utoipa::path(
    post,
    path = "/tenants/provision",
    tag = "tenants",
    request_body = ProvisionRequest,
    responses(
        (status = 200, description = "Tenant provisioned", body = ProvisionResponse),
        (status = 202, description = "Accepted; provisioning continues in the background", body = ProvisionAccepted),
        (status = 207, description = "Site is up but registration is incomplete; resume the tenant", body = DegradedResponse),
        (status = 400, description = "Invalid organization name or request", body = ErrorResponse),
        (status = 409, description = "Subdomain already taken", body = ErrorResponse),
        (status = 502, description = "Site creation failed", body = ErrorResponse),
        (status = 503, description = "Registry unavailable; retry", body = ErrorResponse),
        (status = 504, description = "Still running or outcome unknown; poll the status endpoint", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(org = %request.organization_name, background = request.background))]
pub async fn provision_tenant(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<ProvisionRequest>,
) -> Result<axum::response::Response, HttpAppError> {
    if request.background {
        let subdomain = state.provisioner().preflight(&request).await?;
        drop(state.runner.spawn(request));
        tracing::info!(subdomain = %subdomain, "Provisioning accepted");
        let body = ProvisionAccepted {
            accepted: true,
            status_url: format!("{}?tenant={}", PROVISIONING_STATUS_PATH, subdomain),
            subdomain,
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let tenant = state.runner.run(request).await?;
    Ok(Json(ProvisionResponse::from(tenant)).into_response())
}

/// Finish a `pending` tenant: reconcile the site, then run the remaining steps.
#[utoipa::path(
    post,
    path = "/tenants/{subdomain}/resume",
    tag = "tenants",
    params(("subdomain" = String, Path, description = "Tenant subdomain")),
    responses(
        (status = 200, description = "Tenant provisioned", body = ProvisionResponse),
        (status = 207, description = "Site is up but registration is still incomplete", body = DegradedResponse),
        (status = 400, description = "Tenant is not pending", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse),
        (status = 409, description = "A run for this tenant is in progress", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn resume_tenant(
    State(state): State<Arc<AppState>>,
    Path(subdomain): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let tenant = state.runner.run_resume(&subdomain).await?;
    Ok(Json(ProvisionResponse::from(tenant)))
}
