//! Test helpers: build AppState and router over in-memory collaborators.
//!
//! Run from workspace root: `cargo test -p nexus-api`. No Docker or ERP instance needed:
//! the registry is `InMemoryTenantStore` and the site side is `FakeExecutor`/`FakeSiteAdmin`.

use axum_test::TestServer;
use base64::{engine::general_purpose, Engine as _};
use nexus_api::setup::routes;
use nexus_api::state::AppState;
use nexus_core::{Config, ProvisionerConfig};
use nexus_db::test_helpers::InMemoryTenantStore;
use nexus_services::test_support::{FakeExecutor, FakeSiteAdmin};
use serde_json::{json, Value};
use std::sync::Arc;

/// Must match the secret in `test_config`.
pub const TEST_SECRET: &str = "test-provisioning-secret-at-least-32-characters";

pub const SECRET_HEADER: &str = "X-Provisioning-Secret";

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub store: InMemoryTenantStore,
    pub executor: Arc<FakeExecutor>,
    pub admin: Arc<FakeSiteAdmin>,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn test_config() -> Config {
    Config::new(ProvisionerConfig {
        database_url: Some("postgresql://localhost/nexus_test".to_string()),
        db_root_password: "root".to_string(),
        provisioning_api_secret: TEST_SECRET.to_string(),
        encryption_key: general_purpose::STANDARD.encode([7u8; 32]),
        ..ProvisionerConfig::default()
    })
}

pub fn setup_test_app() -> TestApp {
    setup_test_app_with(FakeExecutor::new())
}

pub fn setup_test_app_with(executor: FakeExecutor) -> TestApp {
    let config = test_config();
    let store = InMemoryTenantStore::new();
    let executor = Arc::new(executor);
    let admin = Arc::new(FakeSiteAdmin::new());

    let state = Arc::new(
        AppState::new(
            Arc::new(config.clone()),
            Arc::new(store.clone()),
            executor.clone(),
            admin.clone(),
        )
        .expect("Failed to build app state"),
    );
    let app = routes::setup_routes(&config, state.clone()).expect("Failed to build router");
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        store,
        executor,
        admin,
    }
}

pub fn signup(org: &str, email: &str) -> Value {
    json!({
        "organization_name": org,
        "admin_email": email,
        "plan": "pro",
    })
}
