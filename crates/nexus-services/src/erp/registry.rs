//! Tenant registry kept in the ERP master site's `SaaS Tenant` doctype
//!
//! Documents are named by subdomain, so the doctype's primary key gives the same
//! uniqueness guarantee as the Postgres `UNIQUE (subdomain)` constraint. Status values
//! are stored capitalized ("Active"), plans by label ("Pro"). Owner emails are stored
//! lowercased so lookups match the case-insensitive Postgres registry.
//!
//! The provisioning lease is taken with `frappe.client.save`, which rejects a document
//! whose `modified` stamp is stale.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use nexus_core::models::{NewTenant, Plan, Tenant, TenantPatch, TenantStatus};
use nexus_core::AppError;
use nexus_db::TenantStore;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::client::{ErpClient, ErpError};

pub const TENANT_DOCTYPE: &str = "SaaS Tenant";
const ERP_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const OWNER_LOOKUP_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct ErpTenantStore {
    client: ErpClient,
}

impl ErpTenantStore {
    /// `client` must be authenticated against the master site.
    pub fn new(client: ErpClient) -> Self {
        Self { client }
    }
}

fn status_label(status: TenantStatus) -> String {
    let s = status.as_str();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?;
    NaiveDateTime::parse_from_str(raw, ERP_DATETIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn text(doc: &Value, field: &str) -> Option<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn counter(doc: &Value, field: &str) -> i32 {
    doc.get(field)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .and_then(|n| i32::try_from(n).ok())
        .unwrap_or(0)
}

fn tenant_from_doc(doc: &Value) -> Result<Tenant, AppError> {
    let subdomain = text(doc, "subdomain")
        .or_else(|| text(doc, "name"))
        .ok_or_else(|| AppError::Internal("SaaS Tenant document has no subdomain".to_string()))?;
    let status = text(doc, "status")
        .map(|s| s.parse::<TenantStatus>())
        .transpose()
        .map_err(AppError::Internal)?
        .unwrap_or(TenantStatus::Pending);
    let plan = text(doc, "plan_type")
        .map(|s| s.parse::<Plan>())
        .transpose()
        .map_err(AppError::Internal)?
        .unwrap_or_default();
    let created_at = parse_timestamp(doc.get("creation")).unwrap_or_else(Utc::now);

    Ok(Tenant {
        id: text(doc, "tenant_id")
            .and_then(|id| Uuid::parse_str(&id).ok())
            .unwrap_or(Uuid::nil()),
        organization_name: text(doc, "organization_name")
            .or_else(|| text(doc, "company_name"))
            .unwrap_or_else(|| subdomain.clone()),
        subdomain,
        owner_email: text(doc, "owner_email").unwrap_or_default(),
        status,
        plan,
        site_url: text(doc, "site_url"),
        api_key: text(doc, "api_key"),
        api_secret_encrypted: text(doc, "api_secret"),
        admin_password_encrypted: text(doc, "admin_password"),
        usage_users: counter(doc, "usage_users"),
        usage_leads: counter(doc, "usage_leads"),
        usage_projects: counter(doc, "usage_projects"),
        usage_invoices: counter(doc, "usage_invoices"),
        usage_storage_mb: counter(doc, "usage_storage"),
        provisioned_at: parse_timestamp(doc.get("provisioned_at")),
        provisioning_lease_at: parse_timestamp(doc.get("provisioning_lease_at")),
        created_at,
        updated_at: parse_timestamp(doc.get("modified")).unwrap_or(created_at),
    })
}

fn doc_from_new(tenant: &NewTenant) -> Value {
    let mut doc = json!({
        "doctype": TENANT_DOCTYPE,
        "name": tenant.subdomain,
        "subdomain": tenant.subdomain,
        "tenant_id": Uuid::new_v4().to_string(),
        "company_name": tenant.organization_name,
        "organization_name": tenant.organization_name,
        "owner_email": normalize_email(&tenant.owner_email),
        "admin_user": normalize_email(&tenant.owner_email),
        "status": status_label(tenant.status),
        "plan_type": tenant.plan.label(),
    });
    if let Some(url) = &tenant.site_url {
        doc["site_url"] = json!(url);
    }
    if let Some(creds) = &tenant.credentials {
        doc["api_key"] = json!(creds.api_key);
        doc["api_secret"] = json!(creds.api_secret_encrypted);
    }
    if let Some(password) = &tenant.admin_password_encrypted {
        doc["admin_password"] = json!(password);
    }
    if let Some(leased_at) = tenant.provisioning_lease_at {
        doc["provisioning_lease_at"] = json!(format_timestamp(leased_at));
    }
    if tenant.status.is_live() {
        doc["provisioned_at"] = json!(format_timestamp(Utc::now()));
    }
    doc
}

fn fields_from_patch(patch: &TenantPatch, current: &Tenant) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(name) = &patch.organization_name {
        fields.insert("organization_name".into(), json!(name));
        fields.insert("company_name".into(), json!(name));
    }
    if let Some(email) = &patch.owner_email {
        fields.insert("owner_email".into(), json!(normalize_email(email)));
        fields.insert("admin_user".into(), json!(normalize_email(email)));
    }
    if let Some(status) = patch.status {
        fields.insert("status".into(), json!(status_label(status)));
    }
    if let Some(plan) = patch.plan {
        fields.insert("plan_type".into(), json!(plan.label()));
    }
    if let Some(url) = &patch.site_url {
        fields.insert("site_url".into(), json!(url));
    }
    if let Some(creds) = &patch.credentials {
        fields.insert("api_key".into(), json!(creds.api_key));
        fields.insert("api_secret".into(), json!(creds.api_secret_encrypted));
    }
    if patch.clear_admin_password {
        fields.insert("admin_password".into(), json!(""));
    }
    if patch.release_lease && current.provisioning_lease_at.is_some() {
        fields.insert("provisioning_lease_at".into(), Value::Null);
    }
    if let (None, Some(ts)) = (current.provisioned_at, patch.provisioned_at) {
        fields.insert("provisioned_at".into(), json!(format_timestamp(ts)));
    }
    fields
}

#[async_trait]
impl TenantStore for ErpTenantStore {
    fn backend_name(&self) -> &'static str {
        "erp"
    }

    #[tracing::instrument(skip(self), fields(db.table = "SaaS Tenant", db.operation = "select"))]
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, AppError> {
        self.client
            .get_optional(TENANT_DOCTYPE, subdomain)
            .await?
            .map(|doc| tenant_from_doc(&doc))
            .transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "SaaS Tenant", db.operation = "select"))]
    async fn find_by_owner_email(
        &self,
        email: &str,
        statuses: &[TenantStatus],
    ) -> Result<Vec<Tenant>, AppError> {
        let labels: Vec<String> = statuses.iter().copied().map(status_label).collect();
        let rows = self
            .client
            .get_list(
                TENANT_DOCTYPE,
                json!([
                    ["owner_email", "=", normalize_email(email)],
                    ["status", "in", labels],
                ]),
                &["*"],
                Some("creation desc"),
                OWNER_LOOKUP_LIMIT,
            )
            .await?;
        rows.iter().map(tenant_from_doc).collect()
    }

    #[tracing::instrument(
        skip(self, tenant),
        fields(db.table = "SaaS Tenant", db.operation = "insert", subdomain = %tenant.subdomain)
    )]
    async fn insert(&self, tenant: NewTenant) -> Result<Tenant, AppError> {
        match self.client.insert(doc_from_new(&tenant)).await {
            Ok(doc) => {
                let created = tenant_from_doc(&doc)?;
                tracing::info!(subdomain = %created.subdomain, status = %created.status, "Tenant document created");
                Ok(created)
            }
            Err(ErpError::DuplicateEntry(_)) => Err(AppError::AlreadyExists(tenant.subdomain)),
            Err(e) => {
                tracing::error!(error = %e, subdomain = %tenant.subdomain, "Failed to create tenant document");
                Err(e.into())
            }
        }
    }

    #[tracing::instrument(
        skip(self, patch),
        fields(db.table = "SaaS Tenant", db.operation = "update", status = ?patch.status)
    )]
    async fn update(&self, subdomain: &str, patch: TenantPatch) -> Result<Tenant, AppError> {
        // No conditional writes on this backend: check the transition against a fresh read.
        let current = self
            .find_by_subdomain(subdomain)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tenant '{}' not found", subdomain)))?;
        if let Some(next) = patch.status {
            if !current.status.can_transition_to(next) {
                return Err(AppError::InvalidStatusTransition {
                    from: current.status,
                    to: next,
                });
            }
        }

        let fields = fields_from_patch(&patch, &current);
        if fields.is_empty() {
            return Ok(current);
        }

        let doc = self
            .client
            .set_values(TENANT_DOCTYPE, subdomain, Value::Object(fields))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, subdomain = %subdomain, "Failed to update tenant document");
                AppError::from(e)
            })?;
        tenant_from_doc(&doc)
    }

    #[tracing::instrument(skip(self), fields(db.table = "SaaS Tenant", db.operation = "update"))]
    async fn acquire_lease(
        &self,
        subdomain: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Tenant>, AppError> {
        let Some(mut doc) = self.client.get_optional(TENANT_DOCTYPE, subdomain).await? else {
            return Ok(None);
        };
        let current = tenant_from_doc(&doc)?;
        if current.status != TenantStatus::Pending || current.lease_held(stale_before) {
            return Ok(None);
        }

        doc["doctype"] = json!(TENANT_DOCTYPE);
        doc["provisioning_lease_at"] = json!(format_timestamp(Utc::now()));
        match self.client.save(doc).await {
            Ok(saved) => tenant_from_doc(&saved).map(Some),
            Err(ErpError::Conflict(_)) => {
                tracing::debug!(subdomain = %subdomain, "Lease lost to a concurrent writer");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.client.ping().await.map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::ErpAuth;

    fn store(url: &str) -> ErpTenantStore {
        let client = ErpClient::new(
            url,
            Some("erp.localhost".to_string()),
            ErpAuth::Token {
                api_key: "k".to_string(),
                api_secret: "s".to_string(),
            },
        )
        .unwrap();
        ErpTenantStore::new(client)
    }

    fn doc(status: &str) -> String {
        json!({
            "message": {
                "name": "acme",
                "subdomain": "acme",
                "tenant_id": "6f1c2f52-9b8e-4a57-9d53-0c8f1c7d2a11",
                "company_name": "Acme Corp",
                "owner_email": "owner@acme.test",
                "status": status,
                "plan_type": "Pro",
                "site_url": "https://acme.avariq.in",
                "api_key": "abc",
                "api_secret": "sealed",
                "usage_users": 3,
                "usage_storage": 12.0,
                "creation": "2025-03-01 10:00:00.123456",
                "modified": "2025-03-02 11:30:00.000000"
            }
        })
        .to_string()
    }

    #[test]
    fn status_labels_are_capitalized() {
        assert_eq!(status_label(TenantStatus::Active), "Active");
        assert_eq!(status_label(TenantStatus::Cancelled), "Cancelled");
    }

    #[tokio::test]
    async fn test_find_decodes_document() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get")
            .with_status(200)
            .with_body(doc("Active"))
            .create_async()
            .await;

        let tenant = store(&server.url())
            .find_by_subdomain("acme")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tenant.status, TenantStatus::Active);
        assert_eq!(tenant.plan, Plan::Pro);
        assert_eq!(tenant.organization_name, "Acme Corp");
        assert_eq!(tenant.usage_users, 3);
        assert_eq!(tenant.usage_storage_mb, 12);
        assert!(tenant.is_ready());
        assert!(tenant.has_credentials());
        assert!(tenant.updated_at > tenant.created_at);
    }

    #[tokio::test]
    async fn test_insert_conflict_is_already_exists() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.insert")
            .with_status(409)
            .with_body(r#"{"exc_type": "DuplicateEntryError"}"#)
            .create_async()
            .await;

        let err = store(&server.url())
            .insert(NewTenant {
                subdomain: "acme".to_string(),
                organization_name: "Acme".to_string(),
                owner_email: "owner@acme.test".to_string(),
                status: TenantStatus::Pending,
                plan: Plan::Free,
                site_url: None,
                credentials: None,
                admin_password_encrypted: None,
                provisioning_lease_at: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(ref s) if s == "acme"));
    }

    #[tokio::test]
    async fn test_update_rejects_backwards_transition_without_writing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get")
            .with_status(200)
            .with_body(doc("Active"))
            .create_async()
            .await;
        let write = server
            .mock("POST", "/api/method/frappe.client.set_value")
            .expect(0)
            .create_async()
            .await;

        let err = store(&server.url())
            .update(
                "acme",
                TenantPatch {
                    status: Some(TenantStatus::Pending),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStatusTransition { .. }));
        write.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_writes_fields_in_one_call() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get")
            .with_status(200)
            .with_body(doc("Pending"))
            .create_async()
            .await;
        let write = server
            .mock("POST", "/api/method/frappe.client.set_value")
            .match_body(mockito::Matcher::PartialJson(json!({
                "doctype": "SaaS Tenant",
                "name": "acme",
                "fieldname": {"status": "Active", "api_key": "new", "api_secret": "sealed-new"}
            })))
            .with_status(200)
            .with_body(doc("Active"))
            .expect(1)
            .create_async()
            .await;

        let updated = store(&server.url())
            .update(
                "acme",
                TenantPatch {
                    status: Some(TenantStatus::Active),
                    credentials: Some(nexus_core::models::StoredCredentials {
                        api_key: "new".to_string(),
                        api_secret_encrypted: "sealed-new".to_string(),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, TenantStatus::Active);
        write.assert_async().await;
    }


    fn pending_doc(lease: Option<&str>) -> String {
        let mut body: Value = serde_json::from_str(&doc("Pending")).unwrap();
        if let Some(lease) = lease {
            body["message"]["provisioning_lease_at"] = json!(lease);
        }
        body.to_string()
    }

    #[tokio::test]
    async fn test_lease_is_saved_against_the_read_revision() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get")
            .with_status(200)
            .with_body(pending_doc(None))
            .create_async()
            .await;
        let save = server
            .mock("POST", "/api/method/frappe.client.save")
            .match_body(mockito::Matcher::PartialJson(json!({
                "doc": {"doctype": "SaaS Tenant", "name": "acme", "modified": "2025-03-02 11:30:00.000000"}
            })))
            .with_status(200)
            .with_body(pending_doc(Some("2025-03-02 11:31:00.000000")))
            .expect(1)
            .create_async()
            .await;

        let leased = store(&server.url())
            .acquire_lease("acme", Utc::now() - chrono::Duration::minutes(10))
            .await
            .unwrap()
            .unwrap();
        assert!(leased.provisioning_lease_at.is_some());
        save.assert_async().await;
    }

    #[tokio::test]
    async fn test_lease_lost_on_timestamp_mismatch() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get")
            .with_status(200)
            .with_body(pending_doc(None))
            .create_async()
            .await;
        let _save = server
            .mock("POST", "/api/method/frappe.client.save")
            .with_status(417)
            .with_body(r#"{"exc_type": "TimestampMismatchError"}"#)
            .create_async()
            .await;

        let leased = store(&server.url())
            .acquire_lease("acme", Utc::now() - chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert!(leased.is_none());
    }

    #[tokio::test]
    async fn test_fresh_lease_is_not_taken_over() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/method/frappe.client.get")
            .with_status(200)
            .with_body(pending_doc(Some("2025-03-02 11:31:00.000000")))
            .create_async()
            .await;
        let save = server
            .mock("POST", "/api/method/frappe.client.save")
            .expect(0)
            .create_async()
            .await;

        let stale_before = NaiveDateTime::parse_from_str("2025-03-02 11:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc();
        let leased = store(&server.url())
            .acquire_lease("acme", stale_before)
            .await
            .unwrap();
        assert!(leased.is_none());
        save.assert_async().await;
    }

    #[tokio::test]
    async fn test_owner_lookup_is_lowercased() {
        let mut server = mockito::Server::new_async().await;
        let row: Value = serde_json::from_str::<Value>(&doc("Active")).unwrap()["message"].clone();
        let list = server
            .mock("POST", "/api/method/frappe.client.get_list")
            .match_body(mockito::Matcher::PartialJson(json!({
                "filters": [
                    ["owner_email", "=", "owner@acme.test"],
                    ["status", "in", ["Active"]]
                ]
            })))
            .with_status(200)
            .with_body(json!({ "message": [row] }).to_string())
            .expect(1)
            .create_async()
            .await;

        let found = store(&server.url())
            .find_by_owner_email(" Owner@ACME.test ", &[TenantStatus::Active])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        list.assert_async().await;

        let doc = doc_from_new(&NewTenant {
            subdomain: "acme".to_string(),
            organization_name: "Acme".to_string(),
            owner_email: "Owner@Acme.Test".to_string(),
            status: TenantStatus::Pending,
            plan: Plan::Free,
            site_url: None,
            credentials: None,
            admin_password_encrypted: None,
            provisioning_lease_at: None,
        });
        assert_eq!(doc["owner_email"], "owner@acme.test");
    }
}
