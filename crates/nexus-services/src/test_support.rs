//! In-process fakes for the provisioner's external collaborators.

use async_trait::async_trait;
use nexus_core::models::{ApiCredentials, Plan};
use nexus_core::AppError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::executor::{SiteCreateOutcome, SiteExecutor, SiteSpec};
use crate::site_admin::{AdminUser, SiteAdmin, SiteLogin};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Site executor that keeps sites in a set. Creation outcomes can be scripted.
#[derive(Default)]
pub struct FakeExecutor {
    sites: Mutex<HashSet<String>>,
    scripted: Mutex<VecDeque<SiteCreateOutcome>>,
    create_delay: Mutex<Option<Duration>>,
    fail_installs: AtomicBool,
    fail_probe: AtomicBool,
    create_calls: AtomicUsize,
    exists_calls: AtomicUsize,
    install_calls: AtomicUsize,
    drop_calls: AtomicUsize,
    reload_calls: AtomicUsize,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create_site` sleeps this long first (use with paused time).
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *lock(&self.create_delay) = Some(delay);
        self
    }

    /// Next `create_site` returns `outcome` without touching the site set.
    pub fn script_create(&self, outcome: SiteCreateOutcome) {
        lock(&self.scripted).push_back(outcome);
    }

    pub fn add_site(&self, site_name: &str) {
        lock(&self.sites).insert(site_name.to_string());
    }

    pub fn has_site(&self, site_name: &str) -> bool {
        lock(&self.sites).contains(site_name)
    }

    pub fn set_fail_installs(&self, fail: bool) {
        self.fail_installs.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_probe(&self, fail: bool) {
        self.fail_probe.store(fail, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn install_calls(&self) -> usize {
        self.install_calls.load(Ordering::SeqCst)
    }

    pub fn drop_calls(&self) -> usize {
        self.drop_calls.load(Ordering::SeqCst)
    }

    pub fn reload_calls(&self) -> usize {
        self.reload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteExecutor for FakeExecutor {
    async fn create_site(&self, spec: &SiteSpec) -> SiteCreateOutcome {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.create_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(outcome) = lock(&self.scripted).pop_front() {
            return outcome;
        }
        if lock(&self.sites).insert(spec.site_name.clone()) {
            SiteCreateOutcome::Created
        } else {
            SiteCreateOutcome::AlreadyExists
        }
    }

    async fn site_exists(&self, site_name: &str) -> Result<bool, AppError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(AppError::Internal("probe failed".to_string()));
        }
        Ok(self.has_site(site_name))
    }

    async fn install_app(&self, _site_name: &str, app: &str) -> Result<(), AppError> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_installs.load(Ordering::SeqCst) {
            return Err(AppError::Internal(format!("install of {} failed", app)));
        }
        Ok(())
    }

    async fn drop_site(&self, site_name: &str) -> Result<(), AppError> {
        self.drop_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.sites).remove(site_name);
        Ok(())
    }

    async fn reload_proxy(&self) -> Result<(), AppError> {
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Site admin that records users and credential pairs per site.
#[derive(Default)]
pub struct FakeSiteAdmin {
    users: Mutex<HashMap<String, HashSet<String>>>,
    credentials: Mutex<HashMap<String, ApiCredentials>>,
    plans: Mutex<HashMap<String, Plan>>,
    fail_admin_user: AtomicBool,
    fail_credentials: AtomicBool,
    fail_plan: AtomicBool,
    rotations_left: Mutex<Option<usize>>,
    admin_user_calls: AtomicUsize,
    credential_calls: AtomicUsize,
}

impl FakeSiteAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_admin_user(&self, fail: bool) {
        self.fail_admin_user.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_credentials(&self, fail: bool) {
        self.fail_credentials.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_plan(&self, fail: bool) {
        self.fail_plan.store(fail, Ordering::SeqCst);
    }

    /// Accept only `n` more rotations; later ones fail as if the site went away.
    /// `None` lifts the limit.
    pub fn limit_rotations(&self, n: Option<usize>) {
        *lock(&self.rotations_left) = n;
    }

    pub fn admin_user_calls(&self) -> usize {
        self.admin_user_calls.load(Ordering::SeqCst)
    }

    pub fn credential_calls(&self) -> usize {
        self.credential_calls.load(Ordering::SeqCst)
    }

    pub fn has_user(&self, site_name: &str, email: &str) -> bool {
        lock(&self.users)
            .get(site_name)
            .is_some_and(|users| users.contains(email))
    }

    /// Pair currently stored on the site's admin user.
    pub fn credentials_for(&self, site_name: &str) -> Option<ApiCredentials> {
        lock(&self.credentials).get(site_name).cloned()
    }

    pub fn plan_for(&self, site_name: &str) -> Option<Plan> {
        lock(&self.plans).get(site_name).copied()
    }
}

#[async_trait]
impl SiteAdmin for FakeSiteAdmin {
    async fn ensure_admin_user(&self, site: &SiteLogin, admin: &AdminUser) -> Result<(), AppError> {
        self.admin_user_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_admin_user.load(Ordering::SeqCst) {
            return Err(AppError::Internal("site unreachable".to_string()));
        }
        lock(&self.users)
            .entry(site.site_name.clone())
            .or_default()
            .insert(admin.email.clone());
        Ok(())
    }

    async fn set_api_credentials(
        &self,
        site: &SiteLogin,
        _user_email: &str,
        credentials: &ApiCredentials,
    ) -> Result<(), AppError> {
        self.credential_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_credentials.load(Ordering::SeqCst) {
            return Err(AppError::Internal("credential write failed".to_string()));
        }
        lock(&self.credentials).insert(site.site_name.clone(), credentials.clone());
        Ok(())
    }

    async fn rotate_api_credentials(
        &self,
        site_name: &str,
        _user_email: &str,
        current: &ApiCredentials,
        replacement: &ApiCredentials,
    ) -> Result<(), AppError> {
        self.credential_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(left) = lock(&self.rotations_left).as_mut() {
            if *left == 0 {
                return Err(AppError::Internal(format!("{} unreachable", site_name)));
            }
            *left -= 1;
        }
        let mut stored = lock(&self.credentials);
        if stored.get(site_name) != Some(current) {
            return Err(AppError::Unauthorized(format!(
                "current credentials rejected by {}",
                site_name
            )));
        }
        stored.insert(site_name.to_string(), replacement.clone());
        Ok(())
    }

    async fn apply_plan_settings(
        &self,
        site: &SiteLogin,
        _organization_name: &str,
        plan: Plan,
    ) -> Result<(), AppError> {
        if self.fail_plan.load(Ordering::SeqCst) {
            return Err(AppError::Internal("settings write failed".to_string()));
        }
        lock(&self.plans).insert(site.site_name.clone(), plan);
        Ok(())
    }
}
