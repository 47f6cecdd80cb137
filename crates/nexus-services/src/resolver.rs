//! Owner-identity lookup used to short-circuit repeat signups.

use nexus_core::models::{ResolvedTenant, TenantStatus};
use nexus_core::AppError;

use crate::registry::MasterRegistry;

/// Statuses that count as "already has a workspace".
pub const RESOLVABLE_STATUSES: [TenantStatus; 3] = [
    TenantStatus::Pending,
    TenantStatus::Trial,
    TenantStatus::Active,
];

#[derive(Clone)]
pub struct TenantResolver {
    registry: MasterRegistry,
}

impl TenantResolver {
    pub fn new(registry: MasterRegistry) -> Self {
        Self { registry }
    }

    /// Strict lookup: registry failures propagate.
    pub async fn try_resolve(&self, email: &str) -> Result<ResolvedTenant, AppError> {
        let tenants = self
            .registry
            .get_by_owner_email(email, &RESOLVABLE_STATUSES)
            .await?;

        // Prefer a live workspace over one still being created.
        let best = tenants
            .iter()
            .find(|t| t.status.is_live())
            .or_else(|| tenants.first());

        Ok(match best {
            Some(tenant) => ResolvedTenant {
                has_tenant: true,
                subdomain: Some(tenant.subdomain.clone()),
                site_url: tenant.site_url.clone(),
                status: Some(tenant.status),
                degraded: false,
            },
            None => ResolvedTenant::default(),
        })
    }

    /// Lookup that degrades to `has_tenant: false` when the registry cannot be read.
    ///
    /// A degraded answer is not proof of absence; the registry upsert remains the
    /// guard against double provisioning.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_by_email(&self, email: &str) -> ResolvedTenant {
        match self.try_resolve(email).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(error = %e, "Tenant lookup failed, answering degraded has_tenant=false");
                ResolvedTenant {
                    degraded: true,
                    ..Default::default()
                }
            }
        }
    }
}
