//! Master registry client
//!
//! Wraps a `TenantStore` with the idempotent upsert (find, then create, and on a
//! uniqueness conflict re-read and update) and seals secrets on the way in.
//! Correctness under concurrent callers rests on the store's uniqueness constraint,
//! not on any in-process lock.

use chrono::{DateTime, Utc};
use nexus_core::models::{
    ApiCredentials, NewTenant, Plan, StoredCredentials, Tenant, TenantPatch, TenantStatus,
    TenantUpsert, UpsertAction,
};
use nexus_core::{AppError, EncryptionService};
use nexus_db::TenantStore;
use std::sync::Arc;

/// Find/create/reconcile rounds before giving up. Only concurrent deletes can use more than two.
const MAX_UPSERT_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct MasterRegistry {
    store: Arc<dyn TenantStore>,
    encryption: EncryptionService,
}

impl MasterRegistry {
    pub fn new(store: Arc<dyn TenantStore>, encryption: EncryptionService) -> Self {
        Self { store, encryption }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        self.store.ping().await
    }

    pub async fn get_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, AppError> {
        self.store.find_by_subdomain(subdomain).await
    }

    pub async fn get_by_owner_email(
        &self,
        email: &str,
        statuses: &[TenantStatus],
    ) -> Result<Vec<Tenant>, AppError> {
        self.store.find_by_owner_email(email, statuses).await
    }

    fn seal(&self, credentials: &ApiCredentials) -> Result<StoredCredentials, AppError> {
        Ok(StoredCredentials {
            api_key: credentials.api_key.clone(),
            api_secret_encrypted: self.encryption.encrypt(&credentials.api_secret)?,
        })
    }

    /// Patch for an existing record. Going live stamps `provisioned_at` and drops the
    /// bootstrap password and the provisioning lease.
    fn patch_from(&self, fields: &TenantUpsert) -> Result<TenantPatch, AppError> {
        let going_live = fields.status.is_some_and(|s| s.is_live());
        Ok(TenantPatch {
            organization_name: fields.organization_name.clone(),
            owner_email: fields.owner_email.clone(),
            status: fields.status,
            plan: fields.plan,
            site_url: fields.site_url.clone(),
            credentials: fields.credentials.as_ref().map(|c| self.seal(c)).transpose()?,
            clear_admin_password: going_live,
            release_lease: going_live,
            provisioned_at: going_live.then(Utc::now),
        })
    }

    fn new_from(&self, subdomain: &str, fields: &TenantUpsert) -> Result<NewTenant, AppError> {
        Ok(NewTenant {
            subdomain: subdomain.to_string(),
            organization_name: fields
                .organization_name
                .clone()
                .unwrap_or_else(|| subdomain.to_string()),
            owner_email: fields.owner_email.clone().unwrap_or_default(),
            status: fields.creation_status(),
            plan: fields.plan.unwrap_or_default(),
            site_url: fields.site_url.clone(),
            credentials: fields.credentials.as_ref().map(|c| self.seal(c)).transpose()?,
            admin_password_encrypted: None,
            provisioning_lease_at: None,
        })
    }

    /// Find-or-create-or-update keyed by subdomain. Never produces a second record.
    #[tracing::instrument(skip(self, upsert), fields(backend = self.store.backend_name()))]
    pub async fn upsert_tenant(
        &self,
        subdomain: &str,
        upsert: TenantUpsert,
    ) -> Result<(Tenant, UpsertAction), AppError> {
        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            if self.store.find_by_subdomain(subdomain).await?.is_some() {
                match self.store.update(subdomain, self.patch_from(&upsert)?).await {
                    Ok(tenant) => {
                        tracing::debug!(attempt, "Registry record updated");
                        return Ok((tenant, UpsertAction::Updated));
                    }
                    // Deleted between the read and the write: start over.
                    Err(AppError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }

            match self.store.insert(self.new_from(subdomain, &upsert)?).await {
                Ok(tenant) => {
                    tracing::info!(status = %tenant.status, "Registry record created");
                    return Ok((tenant, UpsertAction::Created));
                }
                Err(AppError::AlreadyExists(_)) => {
                    tracing::info!(attempt, "Concurrent creator won the race, reconciling as update");
                    match self.store.update(subdomain, self.patch_from(&upsert)?).await {
                        Ok(tenant) => return Ok((tenant, UpsertAction::Updated)),
                        Err(AppError::NotFound(_)) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!("Registry upsert did not converge");
        Err(AppError::RegistryUnavailable(format!(
            "upsert for '{}' did not converge after {} attempts",
            subdomain, MAX_UPSERT_ATTEMPTS
        )))
    }

    /// Strict create of a `pending` record that reserves `subdomain` for one provisioning
    /// run, with that run's lease already taken. Returns `AlreadyExists` when someone else
    /// holds it.
    #[tracing::instrument(skip(self, admin_password), fields(backend = self.store.backend_name()))]
    pub async fn claim(
        &self,
        subdomain: &str,
        organization_name: &str,
        owner_email: &str,
        plan: Plan,
        admin_password: &str,
    ) -> Result<Tenant, AppError> {
        self.store
            .insert(NewTenant {
                subdomain: subdomain.to_string(),
                organization_name: organization_name.to_string(),
                owner_email: owner_email.to_string(),
                status: TenantStatus::Pending,
                plan,
                site_url: None,
                credentials: None,
                admin_password_encrypted: Some(self.encryption.encrypt(admin_password)?),
                provisioning_lease_at: Some(Utc::now()),
            })
            .await
    }

    /// Take the provisioning lease of a `pending` record. Leases taken before
    /// `stale_before` are treated as abandoned. `None` means another run owns the record.
    #[tracing::instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn acquire_lease(
        &self,
        subdomain: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Tenant>, AppError> {
        self.store.acquire_lease(subdomain, stale_before).await
    }

    /// Give up the provisioning lease so the record can be resumed immediately.
    #[tracing::instrument(skip(self))]
    pub async fn release_lease(&self, subdomain: &str) -> Result<(), AppError> {
        let patch = TenantPatch {
            release_lease: true,
            ..Default::default()
        };
        self.store.update(subdomain, patch).await.map(|_| ())
    }

    /// Replace the credential pair. Key and secret change in one write.
    #[tracing::instrument(skip(self, credentials))]
    pub async fn rotate_credentials(
        &self,
        subdomain: &str,
        credentials: &ApiCredentials,
    ) -> Result<Tenant, AppError> {
        let patch = TenantPatch {
            credentials: Some(self.seal(credentials)?),
            ..Default::default()
        };
        self.store.update(subdomain, patch).await
    }

    /// Lifecycle change requested by an external collaborator; the store enforces the graph.
    #[tracing::instrument(skip(self))]
    pub async fn set_status(&self, subdomain: &str, status: TenantStatus) -> Result<Tenant, AppError> {
        let patch = TenantPatch {
            status: Some(status),
            clear_admin_password: status.is_live(),
            release_lease: status.is_live(),
            provisioned_at: status.is_live().then(Utc::now),
            ..Default::default()
        };
        self.store.update(subdomain, patch).await
    }

    /// Decrypted credential pair of a record, if it has one.
    pub fn credentials(&self, tenant: &Tenant) -> Result<Option<ApiCredentials>, AppError> {
        match (&tenant.api_key, &tenant.api_secret_encrypted) {
            (Some(key), Some(sealed)) if !key.is_empty() && !sealed.is_empty() => {
                Ok(Some(ApiCredentials {
                    api_key: key.clone(),
                    api_secret: self.encryption.decrypt(sealed)?,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Decrypted bootstrap admin password kept while the record is `pending`.
    pub fn admin_password(&self, tenant: &Tenant) -> Result<Option<String>, AppError> {
        tenant
            .admin_password_encrypted
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|sealed| self.encryption.decrypt(sealed))
            .transpose()
    }
}
