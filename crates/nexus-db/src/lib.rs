//! Nexus Database Layer
//!
//! Tenant registry storage: the `TenantStore` trait, its Postgres repository, and
//! (behind the `test-helpers` feature) an in-memory store for tests.

pub mod db;
pub mod store;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use db::{run_migrations, PgTenantStore};
pub use store::TenantStore;
