//! In-memory registry store for tests
//!
//! `InMemoryTenantStore` honors the same contract as `PgTenantStore` (strict insert,
//! guarded status updates, atomic credential writes) and adds failure switches.
//! `StaleReadStore` hides records from the first lookups to reproduce the
//! lookup-then-create race deterministically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::models::{NewTenant, Tenant, TenantPatch, TenantStatus};
use nexus_core::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::store::TenantStore;

#[derive(Clone, Default)]
pub struct InMemoryTenantStore {
    tenants: Arc<Mutex<HashMap<String, Tenant>>>,
    unavailable: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    inserts: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Tenant>> {
        self.tenants.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call fails with `RegistryUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Inserts and updates fail with `RegistryUnavailable` while set; reads still work.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn get(&self, subdomain: &str) -> Option<Tenant> {
        self.lock().get(subdomain).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Insert a record directly, bypassing failure switches and counters.
    pub fn seed(&self, tenant: NewTenant) -> Tenant {
        let record = build_tenant(tenant);
        self.lock().insert(record.subdomain.clone(), record.clone());
        record
    }

    /// Move a record's provisioning lease into the past, as if its run died long ago.
    pub fn backdate_lease(&self, subdomain: &str, by: chrono::Duration) {
        if let Some(record) = self.lock().get_mut(subdomain) {
            record.provisioning_lease_at = record.provisioning_lease_at.map(|at| at - by);
        }
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::RegistryUnavailable(
                "in-memory registry offline".to_string(),
            ));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), AppError> {
        self.check_available()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::RegistryUnavailable(
                "in-memory registry rejected write".to_string(),
            ));
        }
        Ok(())
    }
}

fn build_tenant(tenant: NewTenant) -> Tenant {
    let now = Utc::now();
    let (api_key, api_secret_encrypted) = match tenant.credentials {
        Some(c) => (Some(c.api_key), Some(c.api_secret_encrypted)),
        None => (None, None),
    };
    Tenant {
        id: Uuid::new_v4(),
        subdomain: tenant.subdomain,
        organization_name: tenant.organization_name,
        owner_email: tenant.owner_email,
        status: tenant.status,
        plan: tenant.plan,
        site_url: tenant.site_url,
        api_key,
        api_secret_encrypted,
        admin_password_encrypted: tenant.admin_password_encrypted,
        usage_users: 0,
        usage_leads: 0,
        usage_projects: 0,
        usage_invoices: 0,
        usage_storage_mb: 0,
        provisioned_at: tenant.status.is_live().then_some(now),
        provisioning_lease_at: tenant.provisioning_lease_at,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, AppError> {
        self.check_available()?;
        Ok(self.get(subdomain))
    }

    async fn find_by_owner_email(
        &self,
        email: &str,
        statuses: &[TenantStatus],
    ) -> Result<Vec<Tenant>, AppError> {
        self.check_available()?;
        let email = email.trim().to_lowercase();
        let mut found: Vec<Tenant> = self
            .lock()
            .values()
            .filter(|t| t.owner_email.to_lowercase() == email && statuses.contains(&t.status))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn insert(&self, tenant: NewTenant) -> Result<Tenant, AppError> {
        self.check_writable()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);

        let mut tenants = self.lock();
        if tenants.contains_key(&tenant.subdomain) {
            return Err(AppError::AlreadyExists(tenant.subdomain));
        }
        let record = build_tenant(tenant);
        tenants.insert(record.subdomain.clone(), record.clone());
        Ok(record)
    }

    async fn update(&self, subdomain: &str, patch: TenantPatch) -> Result<Tenant, AppError> {
        self.check_writable()?;
        self.updates.fetch_add(1, Ordering::SeqCst);

        let mut tenants = self.lock();
        let record = tenants
            .get_mut(subdomain)
            .ok_or_else(|| AppError::NotFound(format!("Tenant '{}' not found", subdomain)))?;

        if let Some(next) = patch.status {
            if !record.status.can_transition_to(next) {
                return Err(AppError::InvalidStatusTransition {
                    from: record.status,
                    to: next,
                });
            }
            record.status = next;
        }
        if let Some(name) = patch.organization_name {
            record.organization_name = name;
        }
        if let Some(email) = patch.owner_email {
            record.owner_email = email;
        }
        if let Some(plan) = patch.plan {
            record.plan = plan;
        }
        if let Some(url) = patch.site_url {
            record.site_url = Some(url);
        }
        if let Some(creds) = patch.credentials {
            record.api_key = Some(creds.api_key);
            record.api_secret_encrypted = Some(creds.api_secret_encrypted);
        }
        if patch.clear_admin_password {
            record.admin_password_encrypted = None;
        }
        if patch.release_lease {
            record.provisioning_lease_at = None;
        }
        if record.provisioned_at.is_none() {
            record.provisioned_at = patch.provisioned_at;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn acquire_lease(
        &self,
        subdomain: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Tenant>, AppError> {
        self.check_writable()?;
        let mut tenants = self.lock();
        let Some(record) = tenants.get_mut(subdomain) else {
            return Ok(None);
        };
        if record.status != TenantStatus::Pending || record.lease_held(stale_before) {
            return Ok(None);
        }
        let now = Utc::now();
        record.provisioning_lease_at = Some(now);
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check_available()
    }
}

/// Reports "not found" for the first `stale_lookups` subdomain lookups, as if another
/// writer created the record right after this caller looked.
pub struct StaleReadStore<S> {
    inner: S,
    stale_lookups: AtomicUsize,
}

impl<S: TenantStore> StaleReadStore<S> {
    pub fn new(inner: S, stale_lookups: usize) -> Self {
        Self {
            inner,
            stale_lookups: AtomicUsize::new(stale_lookups),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: TenantStore> TenantStore for StaleReadStore<S> {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, AppError> {
        let stale = self
            .stale_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_by_subdomain(subdomain).await
    }

    async fn find_by_owner_email(
        &self,
        email: &str,
        statuses: &[TenantStatus],
    ) -> Result<Vec<Tenant>, AppError> {
        self.inner.find_by_owner_email(email, statuses).await
    }

    async fn insert(&self, tenant: NewTenant) -> Result<Tenant, AppError> {
        self.inner.insert(tenant).await
    }

    async fn update(&self, subdomain: &str, patch: TenantPatch) -> Result<Tenant, AppError> {
        self.inner.update(subdomain, patch).await
    }

    async fn acquire_lease(
        &self,
        subdomain: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Tenant>, AppError> {
        self.inner.acquire_lease(subdomain, stale_before).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::models::{Plan, StoredCredentials};

    fn new_tenant(subdomain: &str, status: TenantStatus) -> NewTenant {
        NewTenant {
            subdomain: subdomain.to_string(),
            organization_name: "Acme".to_string(),
            owner_email: "Owner@Acme.test".to_string(),
            status,
            plan: Plan::Free,
            site_url: None,
            credentials: None,
            admin_password_encrypted: Some("sealed".to_string()),
            provisioning_lease_at: None,
        }
    }

    #[tokio::test]
    async fn insert_is_strict() {
        let store = InMemoryTenantStore::new();
        store.insert(new_tenant("acme", TenantStatus::Pending)).await.unwrap();
        let err = store
            .insert(new_tenant("acme", TenantStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(ref s) if s == "acme"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_rejects_backwards_transition() {
        let store = InMemoryTenantStore::new();
        store.seed(new_tenant("acme", TenantStatus::Active));
        let err = store
            .update(
                "acme",
                TenantPatch {
                    status: Some(TenantStatus::Pending),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidStatusTransition {
                from: TenantStatus::Active,
                to: TenantStatus::Pending
            }
        ));
        assert_eq!(store.get("acme").unwrap().status, TenantStatus::Active);
    }

    #[tokio::test]
    async fn update_writes_credentials_and_clears_password() {
        let store = InMemoryTenantStore::new();
        store.seed(new_tenant("acme", TenantStatus::Pending));
        let updated = store
            .update(
                "acme",
                TenantPatch {
                    status: Some(TenantStatus::Active),
                    site_url: Some("http://acme.localhost".to_string()),
                    credentials: Some(StoredCredentials {
                        api_key: "k".to_string(),
                        api_secret_encrypted: "s".to_string(),
                    }),
                    clear_admin_password: true,
                    provisioned_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_ready());
        assert!(updated.has_credentials());
        assert!(updated.admin_password_encrypted.is_none());
        assert!(updated.provisioned_at.is_some());
    }

    #[tokio::test]
    async fn lease_is_exclusive_until_stale_or_released() {
        let store = InMemoryTenantStore::new();
        store.seed(new_tenant("acme", TenantStatus::Pending));
        let stale_before = Utc::now() - chrono::Duration::minutes(10);

        let first = store.acquire_lease("acme", stale_before).await.unwrap();
        assert!(first.is_some_and(|t| t.provisioning_lease_at.is_some()));
        assert!(store.acquire_lease("acme", stale_before).await.unwrap().is_none());

        // A lease taken before the cutoff counts as abandoned.
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        assert!(store.acquire_lease("acme", cutoff).await.unwrap().is_some());

        store
            .update(
                "acme",
                TenantPatch {
                    release_lease: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(store.get("acme").unwrap().provisioning_lease_at.is_none());
        assert!(store.acquire_lease("acme", stale_before).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lease_requires_a_pending_record() {
        let store = InMemoryTenantStore::new();
        store.seed(new_tenant("acme", TenantStatus::Active));
        let stale_before = Utc::now() - chrono::Duration::minutes(10);
        assert!(store.acquire_lease("acme", stale_before).await.unwrap().is_none());
        assert!(store.acquire_lease("ghost", stale_before).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn owner_email_lookup_is_case_insensitive() {
        let store = InMemoryTenantStore::new();
        store.seed(new_tenant("acme", TenantStatus::Active));
        store.seed(new_tenant("acme-old", TenantStatus::Cancelled));
        let found = store
            .find_by_owner_email("owner@acme.TEST", &[TenantStatus::Active, TenantStatus::Trial])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].subdomain, "acme");
    }

    #[tokio::test]
    async fn stale_reads_hide_existing_record() {
        let inner = InMemoryTenantStore::new();
        inner.seed(new_tenant("acme", TenantStatus::Pending));
        let store = StaleReadStore::new(inner, 1);
        assert!(store.find_by_subdomain("acme").await.unwrap().is_none());
        assert!(store.find_by_subdomain("acme").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryTenantStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.find_by_subdomain("acme").await,
            Err(AppError::RegistryUnavailable(_))
        ));
        assert!(store.ping().await.is_err());
    }
}
