//! Application state shared by all handlers.

use nexus_core::{AppError, Config, EncryptionService};
use nexus_db::TenantStore;
use nexus_services::{
    AvailabilityChecker, MasterRegistry, ProvisioningRunner, SiteAdmin, SiteExecutor,
    SiteProvisioner, StatusService, TenantResolver,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: MasterRegistry,
    pub availability: AvailabilityChecker,
    pub resolver: TenantResolver,
    pub status: StatusService,
    pub runner: ProvisioningRunner,
}

impl AppState {
    /// Wire the services over a registry store and the two external collaborators.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn TenantStore>,
        executor: Arc<dyn SiteExecutor>,
        site_admin: Arc<dyn SiteAdmin>,
    ) -> Result<Self, AppError> {
        let encryption = EncryptionService::from_base64_key(config.encryption_key())?;
        let registry = MasterRegistry::new(store, encryption);
        let provisioner =
            SiteProvisioner::new(config.clone(), registry.clone(), executor, site_admin);

        Ok(Self {
            availability: AvailabilityChecker::new(registry.clone()),
            resolver: TenantResolver::new(registry.clone()),
            status: StatusService::new(registry.clone()),
            runner: ProvisioningRunner::new(provisioner, config.sync_provision_timeout()),
            registry,
            config,
        })
    }

    pub fn provisioner(&self) -> &SiteProvisioner {
        self.runner.provisioner()
    }
}
