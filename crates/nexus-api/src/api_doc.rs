//! OpenAPI documentation, served at `/api/openapi.json` and rendered at `/docs`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::constants::PROVISIONING_SECRET_HEADER;
use crate::error;
use crate::handlers;
use crate::setup::routes::health;
use nexus_core::models;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

struct ProvisioningSecretAddon;

impl Modify for ProvisioningSecretAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "provisioning_secret",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    PROVISIONING_SECRET_HEADER,
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Nexus Provisioning API",
        version = "0.1.0",
        description = "Tenant provisioning control plane: subdomain checks, site provisioning, credential report-back, owner lookup and readiness polling. Every endpoint except health probes requires the X-Provisioning-Secret header."
    ),
    paths(
        health::health_check,
        handlers::subdomain::check_subdomain,
        handlers::provision::provision_tenant,
        handlers::provision::resume_tenant,
        handlers::provisioning_status::provisioning_status,
        handlers::credentials::update_credentials,
        handlers::credentials::rotate_credentials,
        handlers::tenants::get_tenant_by_email,
        handlers::tenants::get_tenant,
        handlers::tenants::change_status,
    ),
    components(schemas(
        models::Tenant,
        models::TenantStatus,
        models::Plan,
        models::ProvisionStep,
        models::ProvisionRequest,
        models::CheckSubdomainRequest,
        models::SubdomainAvailability,
        models::StatusReport,
        models::ResolvedTenant,
        models::UpdateCredentialsRequest,
        models::UpdateCredentialsResponse,
        models::UpsertAction,
        models::StatusChangeRequest,
        handlers::provision::ProvisionResponse,
        handlers::provision::ProvisionAccepted,
        handlers::credentials::RotateCredentialsResponse,
        health::HealthCheckResponse,
        error::ErrorResponse,
        error::DegradedResponse,
    )),
    modifiers(&ProvisioningSecretAddon),
    security(("provisioning_secret" = [])),
    tags(
        (name = "tenants", description = "Tenant provisioning and registry"),
        (name = "provisioning", description = "Readiness polling"),
        (name = "health", description = "Health probes"),
    )
)]
pub struct ApiDoc;
