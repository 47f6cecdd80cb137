//! Subdomain availability handler

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use nexus_core::models::{CheckSubdomainRequest, SubdomainAvailability};
use std::sync::Arc;

/// Check whether a subdomain (or an organization name) can be provisioned.
///
/// Input is normalized first, so `"Acme Corp"` checks `acme-corp`. Malformed and reserved
/// names come back as `available: false` with a reason, not as errors.
#[utoipa::path(
    post,
    path = "/tenants/check-subdomain",
    tag = "tenants",
    request_body = CheckSubdomainRequest,
    responses(
        (status = 200, description = "Availability result", body = SubdomainAvailability),
        (status = 401, description = "Missing or invalid provisioning secret", body = ErrorResponse),
        (status = 503, description = "Registry could not be checked; retry", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(candidate = %request.subdomain))]
pub async fn check_subdomain(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckSubdomainRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let result = state.availability.check_name(&request.subdomain).await?;
    Ok(Json(result))
}
