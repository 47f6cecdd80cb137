//! Pollable provisioning status backed by the registry record.

use async_trait::async_trait;
use nexus_core::models::{StatusReport, Tenant, TenantStatus};
use nexus_core::{AppError, StatusSource};

use crate::registry::MasterRegistry;

#[derive(Clone)]
pub struct StatusService {
    registry: MasterRegistry,
}

/// Readiness message for a registry record.
pub fn report_for(tenant: &Tenant) -> StatusReport {
    let ready = tenant.is_ready();
    let message = match tenant.status {
        _ if ready => "Workspace is ready".to_string(),
        TenantStatus::Pending => "Workspace is being created".to_string(),
        TenantStatus::Trial | TenantStatus::Active => "Finalizing workspace setup...".to_string(),
        status @ (TenantStatus::Suspended | TenantStatus::Cancelled) => {
            format!("Workspace is {}", status)
        }
    };
    StatusReport {
        ready,
        message,
        status: Some(tenant.status),
        site_url: tenant.site_url.clone().filter(|_| ready),
    }
}

impl StatusService {
    pub fn new(registry: MasterRegistry) -> Self {
        Self { registry }
    }

    /// One cheap registry read. An unknown tenant is `ready: false`, not an error.
    #[tracing::instrument(skip(self))]
    pub async fn check_status(&self, subdomain: &str) -> Result<StatusReport, AppError> {
        Ok(match self.registry.get_by_subdomain(subdomain).await? {
            Some(tenant) => report_for(&tenant),
            None => StatusReport {
                ready: false,
                message: "Tenant not found".to_string(),
                status: None,
                site_url: None,
            },
        })
    }
}

#[async_trait]
impl StatusSource for StatusService {
    async fn check_status(&self, subdomain: &str) -> Result<StatusReport, AppError> {
        StatusService::check_status(self, subdomain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::models::{NewTenant, Plan, TenantPatch};
    use nexus_core::{wait_for_ready, EncryptionService, PollPolicy, PollState};
    use nexus_db::test_helpers::InMemoryTenantStore;
    use nexus_db::TenantStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn service(store: &InMemoryTenantStore) -> StatusService {
        let encryption = EncryptionService::from_key_bytes(&[1u8; 32]).unwrap();
        StatusService::new(MasterRegistry::new(Arc::new(store.clone()), encryption))
    }

    fn pending(subdomain: &str) -> NewTenant {
        NewTenant {
            subdomain: subdomain.to_string(),
            organization_name: "Acme".to_string(),
            owner_email: "owner@acme.test".to_string(),
            status: TenantStatus::Pending,
            plan: Plan::Free,
            site_url: None,
            credentials: None,
            admin_password_encrypted: None,
            provisioning_lease_at: None,
        }
    }

    #[tokio::test]
    async fn test_pending_then_ready() {
        let store = InMemoryTenantStore::new();
        store.seed(pending("acme"));
        let status = service(&store);

        let report = status.check_status("acme").await.unwrap();
        assert!(!report.ready);
        assert_eq!(report.message, "Workspace is being created");

        store
            .update(
                "acme",
                TenantPatch {
                    status: Some(TenantStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let report = status.check_status("acme").await.unwrap();
        assert!(!report.ready);
        assert_eq!(report.message, "Finalizing workspace setup...");

        store
            .update(
                "acme",
                TenantPatch {
                    site_url: Some("http://acme.localhost".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let report = status.check_status("acme").await.unwrap();
        assert!(report.ready);
        assert_eq!(report.message, "Workspace is ready");
        assert_eq!(report.site_url.as_deref(), Some("http://acme.localhost"));
    }

    #[tokio::test]
    async fn test_unknown_and_closed_tenants() {
        let store = InMemoryTenantStore::new();
        let report = service(&store).check_status("ghost").await.unwrap();
        assert!(!report.ready);
        assert_eq!(report.message, "Tenant not found");

        let mut closed = pending("closed");
        closed.status = TenantStatus::Suspended;
        closed.site_url = Some("http://closed.localhost".to_string());
        store.seed(closed);
        let report = service(&store).check_status("closed").await.unwrap();
        assert!(!report.ready);
        assert_eq!(report.message, "Workspace is suspended");
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_never_ready_is_delayed() {
        let store = InMemoryTenantStore::new();
        store.seed(pending("acme"));
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_secs(300));

        let state = wait_for_ready(&service(&store), "acme", policy, |_| {}).await;
        assert!(matches!(state, PollState::Delayed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_sees_activation() {
        let store = InMemoryTenantStore::new();
        store.seed(pending("acme"));
        let status = service(&store);

        let activator = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(42)).await;
                store
                    .update(
                        "acme",
                        TenantPatch {
                            status: Some(TenantStatus::Active),
                            site_url: Some("http://acme.localhost".to_string()),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();
            })
        };

        let state = wait_for_ready(&status, "acme", PollPolicy::default(), |_| {}).await;
        activator.await.unwrap();
        assert!(matches!(state, PollState::Ready(ref r) if r.ready));
    }
}
