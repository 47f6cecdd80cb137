//! Database repositories
//!
//! Repositories live under control/ (tenant registry). Each one wraps a `PgPool` and
//! implements the storage trait the service layer consumes.

pub mod control;

pub use control::PgTenantStore;

use anyhow::Context;
use sqlx::PgPool;
use std::path::Path;

/// Apply the workspace migrations to `pool`.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let migrations_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_path)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(pool)
        .await
        .context("Failed to run migrations")?;
    Ok(())
}
