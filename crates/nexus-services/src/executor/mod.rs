//! Site-creation executor seam
//!
//! The provisioner only sees `SiteExecutor`; how a site is actually created (a `bench`
//! invocation inside the backend container) stays behind this trait.

pub mod docker;

use async_trait::async_trait;
use nexus_core::AppError;
use std::fmt;

pub use docker::DockerBenchExecutor;

/// Input for one site creation.
#[derive(Clone)]
pub struct SiteSpec {
    pub site_name: String,
    /// Password for the site's built-in Administrator account.
    pub admin_password: String,
}

impl fmt::Debug for SiteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteSpec")
            .field("site_name", &self.site_name)
            .finish_non_exhaustive()
    }
}

/// The three outcomes of a site creation, plus "it was already there".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteCreateOutcome {
    Created,
    AlreadyExists,
    /// Non-zero exit: the site was not created (partial artifacts may remain).
    Failed(String),
    /// Interrupted or timed out: the site may or may not exist.
    Unknown(String),
}

#[async_trait]
pub trait SiteExecutor: Send + Sync {
    async fn create_site(&self, spec: &SiteSpec) -> SiteCreateOutcome;

    /// Authoritative existence check used to reconcile an `Unknown` outcome.
    async fn site_exists(&self, site_name: &str) -> Result<bool, AppError>;

    /// Install an application; an already-installed app is success.
    async fn install_app(&self, site_name: &str, app: &str) -> Result<(), AppError>;

    /// Remove a site and its database. Used to clean up failed creations.
    async fn drop_site(&self, site_name: &str) -> Result<(), AppError>;

    /// Regenerate reverse-proxy config for all sites and reload it.
    async fn reload_proxy(&self) -> Result<(), AppError>;
}
