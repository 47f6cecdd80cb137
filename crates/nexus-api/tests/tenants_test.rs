//! Registry endpoint integration tests: credential report-back, lookup, lifecycle.
//!
//! Run with: `cargo test -p nexus-api --test tenants_test`

mod helpers;

use helpers::{setup_test_app, signup, SECRET_HEADER, TEST_SECRET};
use nexus_core::models::TenantStatus;
use serde_json::{json, Value};

#[tokio::test]
async fn test_update_credentials_creates_then_updates() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .post("/tenant/update-credentials")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({
            "tenantName": "globex",
            "apiKey": "key-1",
            "apiSecret": "secret-1",
            "ownerEmail": "hank@globex.test",
            "siteUrl": "https://globex.avariq.in",
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["action"], "created");

    let record = app.store.get("globex").unwrap();
    assert_eq!(record.status, TenantStatus::Active);
    assert_eq!(record.api_key.as_deref(), Some("key-1"));

    let response = client
        .post("/tenant/update-credentials")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({
            "tenant_name": "globex",
            "api_key": "key-2",
            "api_secret": "secret-2",
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["action"], "updated");

    let record = app.store.get("globex").unwrap();
    assert_eq!(record.api_key.as_deref(), Some("key-2"));
    assert_eq!(record.owner_email, "hank@globex.test");
    assert_eq!(app.store.len(), 1);
}

#[tokio::test]
async fn test_update_credentials_promotes_pending_when_site_reported() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .post("/tenant/update-credentials")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({"tenant_name": "initech", "api_key": "k", "api_secret": "s"}))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(app.store.get("initech").unwrap().status, TenantStatus::Pending);

    let response = client
        .post("/tenant/update-credentials")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({
            "tenant_name": "initech",
            "api_key": "k",
            "api_secret": "s",
            "site_url": "https://initech.avariq.in",
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let record = app.store.get("initech").unwrap();
    assert_eq!(record.status, TenantStatus::Active);
    assert!(record.is_ready());
}

#[tokio::test]
async fn test_update_credentials_rejects_invalid_tenant_name() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/tenant/update-credentials")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({"tenant_name": "www", "api_key": "k", "api_secret": "s"}))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_NAME");
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_resolve_by_email_before_and_after_provisioning() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .get("/tenants/by-email?email=owner@acme.test")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["has_tenant"], false);
    assert!(body.get("degraded").is_none());

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("Acme", "owner@acme.test"))
        .await;
    assert_eq!(response.status_code(), 200);

    let response = client
        .get("/tenants/by-email?email=Owner@Acme.test")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    let body: Value = response.json();
    assert_eq!(body["has_tenant"], true);
    assert_eq!(body["subdomain"], "acme");
    assert_eq!(body["site_url"], "http://acme.localhost");
}

#[tokio::test]
async fn test_resolve_by_email_outage_is_degraded() {
    let app = setup_test_app();
    app.store.set_unavailable(true);

    let response = app
        .client()
        .get("/tenants/by-email?email=owner@acme.test")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["has_tenant"], false);
    assert_eq!(body["degraded"], true);
}

#[tokio::test]
async fn test_get_tenant_hides_secrets() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .get("/tenants/acme")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    assert_eq!(response.status_code(), 404);

    client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("Acme", "owner@acme.test"))
        .await;

    let response = client
        .get("/tenants/acme")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["subdomain"], "acme");
    assert_eq!(body["status"], "active");
    assert!(body.get("api_secret_encrypted").is_none());
    assert!(body.get("admin_password_encrypted").is_none());
}

#[tokio::test]
async fn test_status_changes_move_forward_only() {
    let app = setup_test_app();
    let client = app.client();

    client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("Acme", "owner@acme.test"))
        .await;

    let response = client
        .post("/tenants/acme/status")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({"status": "suspended"}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "suspended");

    let response = client
        .get("/provisioning-status?tenant=acme")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    let body: Value = response.json();
    assert_eq!(body["ready"], false);
    assert_eq!(body["message"], "Workspace is suspended");

    let response = client
        .post("/tenants/acme/status")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({"status": "active"}))
        .await;
    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_STATUS_TRANSITION");
}
