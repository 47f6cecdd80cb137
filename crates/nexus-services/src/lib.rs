//! Nexus Services Layer
//!
//! This crate is the **provisioning service layer**: the master registry client and its
//! ERP-backed store, the site executor and site admin adapters, and the orchestration
//! built on them (availability, provisioning, resolution, status, background runs).
//! Keep business logic and coordination here; keep thin HTTP handling in nexus-api.

pub mod availability;
pub mod credentials;
pub mod erp;
pub mod executor;
pub mod provisioner;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod site_admin;
pub mod status;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_support;

pub use availability::AvailabilityChecker;
pub use credentials::CredentialIssuer;
pub use erp::{ErpAuth, ErpClient, ErpError, ErpTenantStore};
pub use executor::{DockerBenchExecutor, SiteCreateOutcome, SiteExecutor, SiteSpec};
pub use provisioner::SiteProvisioner;
pub use registry::MasterRegistry;
pub use resolver::TenantResolver;
pub use runner::ProvisioningRunner;
pub use site_admin::{AdminUser, ErpSiteAdmin, SiteAdmin, SiteLogin};
pub use status::StatusService;
