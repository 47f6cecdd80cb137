use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Plan;

/// Tenant lifecycle status.
///
/// `pending → {trial, active} → {suspended, cancelled}`, plus `trial → active` and
/// `suspended → cancelled`. A status may always be re-written with itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "tenant_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Pending,
    Trial,
    Active,
    Suspended,
    Cancelled,
}

impl TenantStatus {
    pub const ALL: [TenantStatus; 5] = [
        TenantStatus::Pending,
        TenantStatus::Trial,
        TenantStatus::Active,
        TenantStatus::Suspended,
        TenantStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Pending => "pending",
            TenantStatus::Trial => "trial",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Cancelled => "cancelled",
        }
    }

    /// Site is provisioned and usable.
    pub fn is_live(&self) -> bool {
        matches!(self, TenantStatus::Trial | TenantStatus::Active)
    }

    /// Set by billing; the site exists but must not be treated as ready.
    pub fn is_closed(&self) -> bool {
        matches!(self, TenantStatus::Suspended | TenantStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: TenantStatus) -> bool {
        use TenantStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Trial)
                    | (Pending, Active)
                    | (Trial, Active)
                    | (Trial, Suspended)
                    | (Trial, Cancelled)
                    | (Active, Suspended)
                    | (Active, Cancelled)
                    | (Suspended, Cancelled)
            )
    }

    /// Every status from which `next` is reachable in one step (including `next` itself).
    pub fn predecessors(next: TenantStatus) -> Vec<TenantStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    /// Case-insensitive; the ERP registry stores capitalized values ("Active").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TenantStatus::Pending),
            "trial" => Ok(TenantStatus::Trial),
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "cancelled" | "canceled" => Ok(TenantStatus::Cancelled),
            other => Err(format!("Unknown tenant status: {}", other)),
        }
    }
}

/// Tenant registry record. One per subdomain.
///
/// The API secret and the bootstrap admin password are stored encrypted and are never
/// serialized; use the master registry client to decrypt them.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Tenant {
    pub id: Uuid,
    pub subdomain: String,
    pub organization_name: String,
    pub owner_email: String,
    pub status: TenantStatus,
    pub plan: Plan,
    pub site_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(skip_serializing, default)]
    pub api_secret_encrypted: Option<String>,
    #[serde(skip_serializing, default)]
    pub admin_password_encrypted: Option<String>,
    pub usage_users: i32,
    pub usage_leads: i32,
    pub usage_projects: i32,
    pub usage_invoices: i32,
    pub usage_storage_mb: i32,
    pub provisioned_at: Option<DateTime<Utc>>,
    /// When a provisioning run took the record. Held only while `pending`.
    pub provisioning_lease_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
            && self
                .api_secret_encrypted
                .as_deref()
                .is_some_and(|s| !s.is_empty())
    }

    /// Whether a provisioning run taken after `stale_before` still holds the record.
    pub fn lease_held(&self, stale_before: DateTime<Utc>) -> bool {
        self.provisioning_lease_at.is_some_and(|at| at >= stale_before)
    }

    /// Ready iff the status is live and the site URL is populated.
    pub fn is_ready(&self) -> bool {
        self.status.is_live() && self.site_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Plaintext API credential pair as issued or returned to a trusted caller.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Credential pair in its stored form. Always written as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    pub api_key: String,
    pub api_secret_encrypted: String,
}

/// Insert payload for a registry store.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub subdomain: String,
    pub organization_name: String,
    pub owner_email: String,
    pub status: TenantStatus,
    pub plan: Plan,
    pub site_url: Option<String>,
    pub credentials: Option<StoredCredentials>,
    pub admin_password_encrypted: Option<String>,
    pub provisioning_lease_at: Option<DateTime<Utc>>,
}

/// Partial update for a registry store. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TenantPatch {
    pub organization_name: Option<String>,
    pub owner_email: Option<String>,
    pub status: Option<TenantStatus>,
    pub plan: Option<Plan>,
    pub site_url: Option<String>,
    pub credentials: Option<StoredCredentials>,
    pub clear_admin_password: bool,
    pub release_lease: bool,
    pub provisioned_at: Option<DateTime<Utc>>,
}

impl TenantPatch {
    pub fn is_empty(&self) -> bool {
        self.organization_name.is_none()
            && self.owner_email.is_none()
            && self.status.is_none()
            && self.plan.is_none()
            && self.site_url.is_none()
            && self.credentials.is_none()
            && !self.clear_admin_password
            && !self.release_lease
            && self.provisioned_at.is_none()
    }
}

/// Fields accepted by the idempotent registry upsert.
#[derive(Debug, Clone, Default)]
pub struct TenantUpsert {
    pub organization_name: Option<String>,
    pub owner_email: Option<String>,
    pub status: Option<TenantStatus>,
    pub plan: Option<Plan>,
    pub site_url: Option<String>,
    pub credentials: Option<ApiCredentials>,
}

impl TenantUpsert {
    /// Status used when the upsert ends up creating the record.
    ///
    /// A trusted caller that reports a finished site (URL and credentials) creates it
    /// directly as `active`; anything less starts as `pending`.
    pub fn creation_status(&self) -> TenantStatus {
        match self.status {
            Some(status) => status,
            None if self.site_url.is_some() && self.credentials.is_some() => TenantStatus::Active,
            None => TenantStatus::Pending,
        }
    }
}

/// Whether an upsert created or updated the record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
}
