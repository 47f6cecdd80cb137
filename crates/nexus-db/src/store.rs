//! Registry store abstraction
//!
//! The master registry client talks to a `TenantStore`, so the Postgres registry, the
//! ERP-doctype registry, and the in-memory test store are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::models::{NewTenant, Tenant, TenantPatch, TenantStatus};
use nexus_core::AppError;

#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, AppError>;

    /// Tenants owned by `email` (case-insensitive) whose status is in `statuses`,
    /// newest first.
    async fn find_by_owner_email(
        &self,
        email: &str,
        statuses: &[TenantStatus],
    ) -> Result<Vec<Tenant>, AppError>;

    /// Strict create. Fails with `AppError::AlreadyExists` when the subdomain is taken.
    async fn insert(&self, tenant: NewTenant) -> Result<Tenant, AppError>;

    /// Apply `patch` to an existing record in one write.
    ///
    /// Fails with `AppError::NotFound` when the record is missing and with
    /// `AppError::InvalidStatusTransition` when the patch moves the status backwards.
    async fn update(&self, subdomain: &str, patch: TenantPatch) -> Result<Tenant, AppError>;

    /// Compare-and-set on the provisioning lease of a `pending` record: stamps it with
    /// the current time when no lease is held or the held one is older than
    /// `stale_before`. Returns `None` when another run holds the lease, or when the record
    /// is missing or no longer pending.
    async fn acquire_lease(
        &self,
        subdomain: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Tenant>, AppError>;

    /// Cheap reachability probe for readiness checks.
    async fn ping(&self) -> Result<(), AppError>;
}
