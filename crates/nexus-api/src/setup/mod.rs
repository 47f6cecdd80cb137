//! Application setup and initialization
//!
//! Everything that runs once at startup: telemetry, the registry store for the configured
//! backend, the site collaborators, and the router.

pub mod database;
pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use nexus_core::{Config, RegistryBackend};
use nexus_db::{PgTenantStore, TenantStore};
use nexus_services::{DockerBenchExecutor, ErpAuth, ErpClient, ErpSiteAdmin, ErpTenantStore};
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.log_format(), config.environment())
        .context("Failed to initialize telemetry")?;
    crate::error::set_production_mode(config.is_production());

    tracing::info!(
        environment = %config.environment(),
        backend = ?config.registry_backend(),
        root_domain = %config.root_domain(),
        "Configuration loaded and validated successfully"
    );

    let store = setup_registry_store(&config).await?;
    let executor = Arc::new(DockerBenchExecutor::new(&config));
    let site_admin = Arc::new(ErpSiteAdmin::new(config.erp_url()));

    let config = Arc::new(config);
    let state = Arc::new(
        AppState::new(config.clone(), store, executor, site_admin)
            .context("Failed to initialize services")?,
    );

    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}

async fn setup_registry_store(config: &Config) -> Result<Arc<dyn TenantStore>> {
    match config.registry_backend() {
        RegistryBackend::Postgres => {
            let pool = database::setup_database(config).await?;
            Ok(Arc::new(PgTenantStore::new(pool)))
        }
        RegistryBackend::Erp => {
            let auth = ErpAuth::Token {
                api_key: config.erp_api_key().unwrap_or_default().to_string(),
                api_secret: config.erp_api_secret().unwrap_or_default().to_string(),
            };
            let client = ErpClient::new(
                config.erp_url(),
                Some(config.master_site_name().to_string()),
                auth,
            )
            .context("Failed to build ERP client")?;
            tracing::info!(
                erp_url = %config.erp_url(),
                site = %config.master_site_name(),
                "Using ERP master registry"
            );
            Ok(Arc::new(ErpTenantStore::new(client)))
        }
    }
}
