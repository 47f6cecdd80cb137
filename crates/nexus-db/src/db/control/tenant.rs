use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::models::{NewTenant, Tenant, TenantPatch, TenantStatus};
use nexus_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::store::TenantStore;

const TENANT_COLUMNS: &str = r#"
    id, subdomain, organization_name, owner_email, status, plan, site_url,
    api_key, api_secret_encrypted, admin_password_encrypted,
    usage_users, usage_leads, usage_projects, usage_invoices, usage_storage_mb,
    provisioned_at, provisioning_lease_at, created_at, updated_at
"#;

/// Connection-level failures mean the registry is unreachable; anything else is a query error.
fn map_db_error(e: sqlx::Error, context: &str) -> AppError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            tracing::error!(error = %e, "{}: registry unreachable", context);
            AppError::RegistryUnavailable(format!("{}: {}", context, e))
        }
        e => {
            tracing::error!(error = %e, "{}", context);
            AppError::Database(e)
        }
    }
}

/// Postgres-backed tenant registry.
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    #[tracing::instrument(skip(self), fields(db.table = "tenants", db.operation = "select"))]
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, AppError> {
        let query = format!("SELECT {} FROM tenants WHERE subdomain = $1", TENANT_COLUMNS);
        sqlx::query_as::<Postgres, Tenant>(&query)
            .bind(subdomain)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error(e, "Failed to fetch tenant by subdomain"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "tenants", db.operation = "select"))]
    async fn find_by_owner_email(
        &self,
        email: &str,
        statuses: &[TenantStatus],
    ) -> Result<Vec<Tenant>, AppError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let query = format!(
            r#"
            SELECT {} FROM tenants
            WHERE LOWER(owner_email) = LOWER($1) AND status::text = ANY($2)
            ORDER BY created_at DESC
            "#,
            TENANT_COLUMNS
        );
        sqlx::query_as::<Postgres, Tenant>(&query)
            .bind(email.trim())
            .bind(&statuses)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error(e, "Failed to list tenants by owner email"))
    }

    #[tracing::instrument(
        skip(self, tenant),
        fields(db.table = "tenants", db.operation = "insert", subdomain = %tenant.subdomain)
    )]
    async fn insert(&self, tenant: NewTenant) -> Result<Tenant, AppError> {
        let (api_key, api_secret_encrypted) = match tenant.credentials {
            Some(c) => (Some(c.api_key), Some(c.api_secret_encrypted)),
            None => (None, None),
        };
        let provisioned_at = tenant.status.is_live().then(Utc::now);

        let query = format!(
            r#"
            INSERT INTO tenants (
                id, subdomain, organization_name, owner_email, status, plan, site_url,
                api_key, api_secret_encrypted, admin_password_encrypted, provisioned_at,
                provisioning_lease_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            TENANT_COLUMNS
        );
        let result = sqlx::query_as::<Postgres, Tenant>(&query)
            .bind(Uuid::new_v4())
            .bind(&tenant.subdomain)
            .bind(&tenant.organization_name)
            .bind(&tenant.owner_email)
            .bind(tenant.status)
            .bind(tenant.plan)
            .bind(&tenant.site_url)
            .bind(api_key)
            .bind(api_secret_encrypted)
            .bind(&tenant.admin_password_encrypted)
            .bind(provisioned_at)
            .bind(tenant.provisioning_lease_at)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(created) => {
                tracing::info!(
                    tenant_id = %created.id,
                    subdomain = %created.subdomain,
                    status = %created.status,
                    "Tenant record created"
                );
                Ok(created)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tracing::debug!(subdomain = %tenant.subdomain, "Tenant insert hit unique constraint");
                Err(AppError::AlreadyExists(tenant.subdomain))
            }
            Err(e) => Err(map_db_error(e, "Failed to create tenant")),
        }
    }

    #[tracing::instrument(
        skip(self, patch),
        fields(db.table = "tenants", db.operation = "update", status = ?patch.status)
    )]
    async fn update(&self, subdomain: &str, patch: TenantPatch) -> Result<Tenant, AppError> {
        let (api_key, api_secret_encrypted) = match patch.credentials {
            Some(c) => (Some(c.api_key), Some(c.api_secret_encrypted)),
            None => (None, None),
        };
        // The status guard makes the transition check and the write one statement.
        let allowed_from: Vec<String> = match patch.status {
            Some(next) => TenantStatus::predecessors(next)
                .into_iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            None => TenantStatus::ALL
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
        };

        let query = format!(
            r#"
            UPDATE tenants SET
                organization_name = COALESCE($2, organization_name),
                owner_email = COALESCE($3, owner_email),
                status = COALESCE($4, status),
                plan = COALESCE($5, plan),
                site_url = COALESCE($6, site_url),
                api_key = COALESCE($7, api_key),
                api_secret_encrypted = COALESCE($8, api_secret_encrypted),
                admin_password_encrypted = CASE WHEN $9 THEN NULL ELSE admin_password_encrypted END,
                provisioned_at = COALESCE(provisioned_at, $10),
                provisioning_lease_at = CASE WHEN $12 THEN NULL ELSE provisioning_lease_at END,
                updated_at = NOW()
            WHERE subdomain = $1 AND status::text = ANY($11)
            RETURNING {}
            "#,
            TENANT_COLUMNS
        );
        let updated = sqlx::query_as::<Postgres, Tenant>(&query)
            .bind(subdomain)
            .bind(&patch.organization_name)
            .bind(&patch.owner_email)
            .bind(patch.status)
            .bind(patch.plan)
            .bind(&patch.site_url)
            .bind(api_key)
            .bind(api_secret_encrypted)
            .bind(patch.clear_admin_password)
            .bind(patch.provisioned_at)
            .bind(&allowed_from)
            .bind(patch.release_lease)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error(e, "Failed to update tenant"))?;

        if let Some(tenant) = updated {
            tracing::debug!(subdomain = %subdomain, status = %tenant.status, "Tenant record updated");
            return Ok(tenant);
        }

        match (self.find_by_subdomain(subdomain).await?, patch.status) {
            (Some(current), Some(next)) => Err(AppError::InvalidStatusTransition {
                from: current.status,
                to: next,
            }),
            _ => Err(AppError::NotFound(format!("Tenant '{}' not found", subdomain))),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "tenants", db.operation = "update"))]
    async fn acquire_lease(
        &self,
        subdomain: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Tenant>, AppError> {
        let query = format!(
            r#"
            UPDATE tenants SET provisioning_lease_at = NOW(), updated_at = NOW()
            WHERE subdomain = $1
              AND status = 'pending'
              AND (provisioning_lease_at IS NULL OR provisioning_lease_at < $2)
            RETURNING {}
            "#,
            TENANT_COLUMNS
        );
        let leased = sqlx::query_as::<Postgres, Tenant>(&query)
            .bind(subdomain)
            .bind(stale_before)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error(e, "Failed to take provisioning lease"))?;
        tracing::debug!(subdomain = %subdomain, acquired = leased.is_some(), "Provisioning lease");
        Ok(leased)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(e, "Registry ping failed"))?;
        Ok(())
    }
}
