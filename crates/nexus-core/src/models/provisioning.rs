use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

use super::{ApiCredentials, Plan, TenantStatus, UpsertAction};

/// Named steps of the provisioning pipeline, used in logs, results, and degraded errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    Normalize,
    AvailabilityCheck,
    Claim,
    SiteCreation,
    AppInstall,
    AdminUser,
    Credentials,
    PlanSettings,
    RegistryUpsert,
    ProxyReload,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::Normalize => "normalize",
            ProvisionStep::AvailabilityCheck => "availability check",
            ProvisionStep::Claim => "claim",
            ProvisionStep::SiteCreation => "site creation",
            ProvisionStep::AppInstall => "app install",
            ProvisionStep::AdminUser => "admin user",
            ProvisionStep::Credentials => "credentials",
            ProvisionStep::PlanSettings => "plan settings",
            ProvisionStep::RegistryUpsert => "registry upsert",
            ProvisionStep::ProxyReload => "proxy reload",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signup request for a new tenant site.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProvisionRequest {
    #[validate(length(min = 1, max = 100))]
    pub organization_name: String,
    #[validate(email)]
    pub admin_email: String,
    /// Generated when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 8, max = 128))]
    pub admin_password: Option<String>,
    /// Display name for the site's admin user; defaults to the email's local part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100))]
    pub admin_name: Option<String>,
    #[serde(default)]
    pub plan: Plan,
    /// Return 202 immediately and provision in the background.
    #[serde(default)]
    pub background: bool,
}

impl ProvisionRequest {
    pub fn admin_display_name(&self) -> String {
        match self.admin_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self
                .admin_email
                .split('@')
                .next()
                .unwrap_or("Admin")
                .to_string(),
        }
    }
}

/// Successful provisioning result, including secrets for the caller to hand over once.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct ProvisionedTenant {
    pub subdomain: String,
    pub site_name: String,
    pub site_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub admin_password: String,
    pub plan: Plan,
    pub status: TenantStatus,
    pub steps_completed: Vec<ProvisionStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ProvisionedTenant {
    pub fn credentials(&self) -> ApiCredentials {
        ApiCredentials {
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
        }
    }
}

impl fmt::Debug for ProvisionedTenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedTenant")
            .field("subdomain", &self.subdomain)
            .field("site_url", &self.site_url)
            .field("api_key", &self.api_key)
            .field("plan", &self.plan)
            .field("status", &self.status)
            .field("steps_completed", &self.steps_completed)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

/// Result of an availability check. `reason` is set whenever `available` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubdomainAvailability {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Normalized form of the candidate that was checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
}

impl SubdomainAvailability {
    pub fn available(subdomain: &str) -> Self {
        Self {
            available: true,
            reason: None,
            subdomain: Some(subdomain.to_string()),
        }
    }

    pub fn taken(subdomain: &str) -> Self {
        Self {
            available: false,
            reason: Some(format!("Subdomain '{}' is already taken", subdomain)),
            subdomain: Some(subdomain.to_string()),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
            subdomain: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckSubdomainRequest {
    pub subdomain: String,
}

/// Readiness of a tenant's workspace as seen by pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusReport {
    pub ready: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TenantStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
}

/// Resolver answer for an owner identity.
///
/// `degraded` is true when the registry could not be read: `has_tenant` is then false
/// without being proof that no tenant exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedTenant {
    pub has_tenant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TenantStatus>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// Report-back entry point used by provisioning pipelines.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCredentialsRequest {
    #[serde(alias = "tenantName")]
    #[validate(length(min = 1, max = 63))]
    pub tenant_name: String,
    #[serde(alias = "apiKey")]
    #[validate(length(min = 1, max = 255))]
    pub api_key: String,
    #[serde(alias = "apiSecret")]
    #[validate(length(min = 1, max = 255))]
    pub api_secret: String,
    #[serde(default, alias = "ownerEmail", skip_serializing_if = "Option::is_none")]
    #[validate(email)]
    pub owner_email: Option<String>,
    #[serde(default, alias = "siteUrl", skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub site_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateCredentialsResponse {
    pub success: bool,
    pub action: UpsertAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusChangeRequest {
    pub status: TenantStatus,
}
