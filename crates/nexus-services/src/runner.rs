//! Background provisioning runs
//!
//! Every run is a task on a `TaskTracker`, so it outlives the request that started it
//! (client disconnects and sync timeouts do not cancel site creation) and shutdown can
//! wait for in-flight runs.

use nexus_core::models::{ProvisionRequest, ProvisionedTenant};
use nexus_core::AppError;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::provisioner::SiteProvisioner;

#[derive(Clone)]
pub struct ProvisioningRunner {
    provisioner: SiteProvisioner,
    tracker: TaskTracker,
    sync_timeout: Duration,
}

impl ProvisioningRunner {
    pub fn new(provisioner: SiteProvisioner, sync_timeout: Duration) -> Self {
        Self {
            provisioner,
            tracker: TaskTracker::new(),
            sync_timeout,
        }
    }

    pub fn provisioner(&self) -> &SiteProvisioner {
        &self.provisioner
    }

    /// Runs currently tracked.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    fn track<F>(&self, run: F) -> JoinHandle<Result<ProvisionedTenant, AppError>>
    where
        F: Future<Output = Result<ProvisionedTenant, AppError>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            let result = run.await;
            match &result {
                Ok(tenant) => {
                    tracing::info!(subdomain = %tenant.subdomain, "Provisioning run finished")
                }
                Err(e) if e.is_degraded() => {
                    tracing::warn!(error = %e, "Provisioning run finished degraded")
                }
                Err(e) => tracing::error!(error = %e, "Provisioning run failed"),
            }
            result
        })
    }

    /// Start a run and return immediately. The outcome lands in the registry and the log.
    pub fn spawn(&self, request: ProvisionRequest) -> JoinHandle<Result<ProvisionedTenant, AppError>> {
        let provisioner = self.provisioner.clone();
        self.track(async move { provisioner.provision(request).await })
    }

    pub fn spawn_resume(&self, subdomain: String) -> JoinHandle<Result<ProvisionedTenant, AppError>> {
        let provisioner = self.provisioner.clone();
        self.track(async move { provisioner.resume(&subdomain).await })
    }

    async fn wait(
        &self,
        handle: JoinHandle<Result<ProvisionedTenant, AppError>>,
    ) -> Result<ProvisionedTenant, AppError> {
        match tokio::time::timeout(self.sync_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AppError::Internal(format!(
                "Provisioning task aborted: {}",
                join_error
            ))),
            // The run keeps going in the tracker.
            Err(_) => Err(AppError::Timeout(format!(
                "provisioning still running after {}s; poll the status endpoint",
                self.sync_timeout.as_secs()
            ))),
        }
    }

    /// Start a run and wait for it up to the sync timeout.
    pub async fn run(&self, request: ProvisionRequest) -> Result<ProvisionedTenant, AppError> {
        let handle = self.spawn(request);
        self.wait(handle).await
    }

    pub async fn run_resume(&self, subdomain: &str) -> Result<ProvisionedTenant, AppError> {
        let handle = self.spawn_resume(subdomain.to_string());
        self.wait(handle).await
    }

    /// Stop accepting runs and wait up to `grace` for in-flight ones. Returns whether all
    /// finished.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let remaining = self.tracker.len();
        if remaining > 0 {
            tracing::info!(remaining, "Waiting for in-flight provisioning runs");
        }
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(remaining = self.tracker.len(), "Shutdown grace period elapsed with runs still in flight");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MasterRegistry;
    use crate::test_support::{FakeExecutor, FakeSiteAdmin};
    use nexus_core::models::{Plan, TenantStatus};
    use nexus_core::{Config, EncryptionService, ProvisionerConfig};
    use nexus_db::test_helpers::InMemoryTenantStore;
    use std::sync::Arc;

    fn runner(store: &InMemoryTenantStore, delay: Duration) -> ProvisioningRunner {
        let encryption = EncryptionService::from_key_bytes(&[3u8; 32]).unwrap();
        let registry = MasterRegistry::new(Arc::new(store.clone()), encryption);
        let provisioner = SiteProvisioner::new(
            Arc::new(Config::new(ProvisionerConfig::default())),
            registry,
            Arc::new(FakeExecutor::new().with_create_delay(delay)),
            Arc::new(FakeSiteAdmin::new()),
        );
        ProvisioningRunner::new(provisioner, Duration::from_secs(120))
    }

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            organization_name: "Acme".to_string(),
            admin_email: "owner@acme.test".to_string(),
            admin_password: None,
            admin_name: None,
            plan: Plan::Free,
            background: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_run_within_timeout() {
        let store = InMemoryTenantStore::new();
        let result = runner(&store, Duration::from_secs(30)).run(request()).await;
        tokio_test::assert_ok!(result);
        assert_eq!(store.get("acme").unwrap().status, TenantStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_run_going() {
        let store = InMemoryTenantStore::new();
        let runner = runner(&store, Duration::from_secs(200));

        let err = runner.run(request()).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
        assert_eq!(store.get("acme").unwrap().status, TenantStatus::Pending);
        assert_eq!(runner.in_flight(), 1);

        assert!(runner.shutdown(Duration::from_secs(600)).await);
        assert_eq!(store.get("acme").unwrap().status, TenantStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_run_completes_after_handle_dropped() {
        let store = InMemoryTenantStore::new();
        let runner = runner(&store, Duration::from_secs(45));

        drop(runner.spawn(request()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.get("acme").unwrap().status, TenantStatus::Pending);

        assert!(runner.shutdown(Duration::from_secs(60)).await);
        assert!(store.get("acme").unwrap().is_ready());
        assert_eq!(runner.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_grace_can_expire() {
        let store = InMemoryTenantStore::new();
        let runner = runner(&store, Duration::from_secs(300));
        drop(runner.spawn(request()));
        assert!(!runner.shutdown(Duration::from_secs(10)).await);
    }
}
