//! Provisioning endpoint integration tests.
//!
//! Run with: `cargo test -p nexus-api --test provisioning_test`

mod helpers;

use futures::future::join_all;
use helpers::{setup_test_app, signup, SECRET_HEADER, TEST_SECRET};
use nexus_core::models::TenantStatus;
use serde_json::{json, Value};
use std::future::IntoFuture;
use std::time::Duration;

#[tokio::test]
async fn test_requests_without_secret_are_rejected() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .post("/tenants/check-subdomain")
        .json(&json!({"subdomain": "acme"}))
        .await;
    assert_eq!(response.status_code(), 401);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, "wrong-secret")
        .json(&signup("Acme", "owner@acme.test"))
        .await;
    assert_eq!(response.status_code(), 401);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_health_is_public() {
    let app = setup_test_app();

    let response = app.client().get("/health").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["registry"], "healthy");
    assert_eq!(body["provisioning_runs"], 0);

    app.store.set_unavailable(true);
    let response = app.client().get("/ready").await;
    assert_eq!(response.status_code(), 503);
}

#[tokio::test]
async fn test_check_subdomain_normalizes_and_rejects_reserved() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .post("/tenants/check-subdomain")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({"subdomain": "Acme Corp"}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["available"], true);
    assert_eq!(body["subdomain"], "acme-corp");

    let response = client
        .post("/tenants/check-subdomain")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({"subdomain": "admin"}))
        .await;
    let body: Value = response.json();
    assert_eq!(body["available"], false);
    assert!(body["reason"].as_str().is_some());
}

#[tokio::test]
async fn test_check_subdomain_registry_outage_is_503() {
    let app = setup_test_app();
    app.store.set_unavailable(true);

    let response = app
        .client()
        .post("/tenants/check-subdomain")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({"subdomain": "acme"}))
        .await;
    assert_eq!(response.status_code(), 503);
    let body: Value = response.json();
    assert_eq!(body["code"], "CHECK_FAILED");
    assert_eq!(body["recoverable"], true);
}

#[tokio::test]
async fn test_provision_then_duplicate_is_conflict() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("Acme Corp", "owner@acme.test"))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["subdomain"], "acme-corp");
    assert_eq!(body["site_url"], "http://acme-corp.localhost");
    assert_eq!(body["plan"], "pro");
    assert_eq!(body["status"], "active");
    assert!(!body["api_key"].as_str().unwrap().is_empty());
    assert!(!body["api_secret"].as_str().unwrap().is_empty());
    assert!(!body["admin_password"].as_str().unwrap().is_empty());

    let record = app.store.get("acme-corp").unwrap();
    assert_eq!(record.status, TenantStatus::Active);
    assert_eq!(record.api_key.as_deref(), body["api_key"].as_str());

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("ACME corp!", "someone@else.test"))
        .await;
    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert_eq!(body["code"], "SUBDOMAIN_TAKEN");
    assert_eq!(app.executor.create_calls(), 1);
}

#[tokio::test]
async fn test_provision_rejects_bad_input() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("!!", "owner@acme.test"))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_NAME");

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("Acme", "not-an-email"))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&json!({"admin_email": "owner@acme.test"}))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");

    assert_eq!(app.executor.create_calls(), 0);
}

#[tokio::test]
async fn test_concurrent_signups_create_one_site() {
    let app = setup_test_app();
    let client = app.client();

    let requests = (0..4).map(|i| {
        client
            .post("/tenants/provision")
            .add_header(SECRET_HEADER, TEST_SECRET)
            .json(&signup("Acme Corp", &format!("owner{}@acme.test", i)))
            .into_future()
    });
    let statuses: Vec<u16> = join_all(requests)
        .await
        .iter()
        .map(|r| r.status_code().as_u16())
        .collect();

    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == 409).count(), 3);
    assert_eq!(app.executor.create_calls(), 1);
    assert_eq!(app.store.len(), 1);
}

#[tokio::test]
async fn test_credential_failure_is_207_then_resumes() {
    let app = setup_test_app();
    let client = app.client();
    app.admin.set_fail_credentials(true);

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("Acme", "owner@acme.test"))
        .await;
    assert_eq!(response.status_code(), 207);
    let body: Value = response.json();
    assert_eq!(body["degraded"], true);
    assert_eq!(body["success"], false);
    assert_eq!(body["subdomain"], "acme");
    assert_eq!(body["site_url"], "http://acme.localhost");
    assert_eq!(body["step"], "credentials");
    assert_eq!(body["code"], "REGISTRY_WRITE_FAILED");
    assert_eq!(app.store.get("acme").unwrap().status, TenantStatus::Pending);

    app.admin.set_fail_credentials(false);
    let response = client
        .post("/tenants/acme/resume")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "active");
    assert_eq!(app.executor.create_calls(), 1);
    assert!(app.store.get("acme").unwrap().is_ready());
}

#[tokio::test]
async fn test_background_provision_is_accepted_then_ready() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .get("/provisioning-status?tenant=acme")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["ready"], false);
    assert_eq!(body["message"], "Tenant not found");

    let mut request = signup("Acme", "owner@acme.test");
    request["background"] = json!(true);
    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&request)
        .await;
    assert_eq!(response.status_code(), 202);
    let body: Value = response.json();
    assert_eq!(body["accepted"], true);
    assert_eq!(body["subdomain"], "acme");
    assert_eq!(body["status_url"], "/provisioning-status?tenant=acme");

    assert!(app.state.runner.shutdown(Duration::from_secs(5)).await);

    let response = client
        .get("/provisioning-status?tenant=acme")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    let body: Value = response.json();
    assert_eq!(body["ready"], true);
    assert_eq!(body["message"], "Workspace is ready");
    assert_eq!(body["site_url"], "http://acme.localhost");
}

#[tokio::test]
async fn test_background_provision_fails_fast_on_taken_name() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("Acme", "owner@acme.test"))
        .await;
    assert_eq!(response.status_code(), 200);

    let mut request = signup("Acme", "other@acme.test");
    request["background"] = json!(true);
    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&request)
        .await;
    assert_eq!(response.status_code(), 409);
    assert_eq!(app.state.runner.in_flight(), 0);
}

#[tokio::test]
async fn test_status_requires_tenant_parameter() {
    let app = setup_test_app();

    let response = app
        .client()
        .get("/provisioning-status")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_rotate_credentials_replaces_pair() {
    let app = setup_test_app();
    let client = app.client();

    let response = client
        .post("/tenants/provision")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .json(&signup("Acme", "owner@acme.test"))
        .await;
    let issued: Value = response.json();

    let response = client
        .post("/tenants/acme/rotate-credentials")
        .add_header(SECRET_HEADER, TEST_SECRET)
        .await;
    assert_eq!(response.status_code(), 200);
    let rotated: Value = response.json();
    assert_ne!(rotated["api_key"], issued["api_key"]);
    assert_ne!(rotated["api_secret"], issued["api_secret"]);
    assert_eq!(
        app.store.get("acme").unwrap().api_key.as_deref(),
        rotated["api_key"].as_str()
    );
    let on_site = app.admin.credentials_for("acme.localhost").unwrap();
    assert_eq!(Some(on_site.api_key.as_str()), rotated["api_key"].as_str());
}
