//! Domain methods for the provisioning API client.

use crate::ApiClient;
use anyhow::Result;
use async_trait::async_trait;
use nexus_core::models::{
    CheckSubdomainRequest, ProvisionRequest, ProvisionStep, ProvisionedTenant, ResolvedTenant,
    StatusChangeRequest, StatusReport, SubdomainAvailability, Tenant, TenantStatus,
    UpdateCredentialsRequest, UpdateCredentialsResponse,
};
use nexus_core::{AppError, StatusSource};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// 202 body of a background provisioning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionAccepted {
    pub accepted: bool,
    pub subdomain: String,
    pub status_url: String,
}

/// 207 body: the site is up but a bookkeeping step did not complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradedResult {
    pub subdomain: String,
    pub site_url: String,
    pub step: ProvisionStep,
    pub error: String,
    #[serde(default)]
    pub suggested_action: Option<String>,
    /// Set when the site holds a pair the registry did not record.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    Provisioned(ProvisionedTenant),
    Accepted(ProvisionAccepted),
    Degraded(DegradedResult),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatedCredentials {
    pub subdomain: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RotationOutcome {
    Rotated(RotatedCredentials),
    Degraded(DegradedResult),
}

impl ApiClient {
    pub async fn check_subdomain(&self, candidate: &str) -> Result<SubdomainAvailability> {
        self.post_json(
            "/tenants/check-subdomain",
            &CheckSubdomainRequest {
                subdomain: candidate.to_string(),
            },
        )
        .await
    }

    /// Provision a tenant. 200, 202 and 207 are all outcomes, not errors.
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionOutcome> {
        self.provisioning_call("/tenants/provision", Some(request))
            .await
    }

    pub async fn resume(&self, subdomain: &str) -> Result<ProvisionOutcome> {
        self.provisioning_call::<()>(&format!("/tenants/{}/resume", subdomain), None)
            .await
    }

    async fn provisioning_call<B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<ProvisionOutcome> {
        let mut request = self.client().post(self.build_url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.send(request).await?;
        match response.status() {
            StatusCode::OK => Ok(ProvisionOutcome::Provisioned(Self::parse(response).await?)),
            StatusCode::ACCEPTED => Ok(ProvisionOutcome::Accepted(Self::parse(response).await?)),
            StatusCode::MULTI_STATUS => Ok(ProvisionOutcome::Degraded(Self::parse(response).await?)),
            _ => Err(Self::error_from(response).await),
        }
    }

    pub async fn provisioning_status(&self, subdomain: &str) -> Result<StatusReport> {
        self.get("/provisioning-status", &[("tenant", subdomain)])
            .await
    }

    pub async fn update_credentials(
        &self,
        request: &UpdateCredentialsRequest,
    ) -> Result<UpdateCredentialsResponse> {
        self.post_json("/tenant/update-credentials", request).await
    }

    pub async fn resolve_by_email(&self, email: &str) -> Result<ResolvedTenant> {
        self.get("/tenants/by-email", &[("email", email)]).await
    }

    pub async fn get_tenant(&self, subdomain: &str) -> Result<Tenant> {
        self.get(&format!("/tenants/{}", subdomain), &[]).await
    }

    /// Rotate a tenant's pair. A 207 means the site holds a pair the registry missed.
    pub async fn rotate_credentials(&self, subdomain: &str) -> Result<RotationOutcome> {
        let request = self
            .client()
            .post(self.build_url(&format!("/tenants/{}/rotate-credentials", subdomain)))
            .json(&serde_json::json!({}));
        let response = self.send(request).await?;
        match response.status() {
            StatusCode::OK => Ok(RotationOutcome::Rotated(Self::parse(response).await?)),
            StatusCode::MULTI_STATUS => Ok(RotationOutcome::Degraded(Self::parse(response).await?)),
            _ => Err(Self::error_from(response).await),
        }
    }

    pub async fn change_status(&self, subdomain: &str, status: TenantStatus) -> Result<Tenant> {
        self.post_json(
            &format!("/tenants/{}/status", subdomain),
            &StatusChangeRequest { status },
        )
        .await
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn check_status(&self, subdomain: &str) -> Result<StatusReport, AppError> {
        self.provisioning_status(subdomain)
            .await
            .map_err(|e| AppError::RegistryUnavailable(e.to_string()))
    }
}
