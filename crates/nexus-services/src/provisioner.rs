//! Site provisioner
//!
//! Pipeline: normalize → availability → claim (`pending` record) → create site → install
//! apps → admin user → credentials → plan settings → registry upsert (`active`) → proxy reload.
//!
//! Once the site exists, any failure that leaves bookkeeping incomplete is returned as
//! `AppError::RegistryWriteFailed` so the caller can `resume` instead of re-provisioning.
//! The claimed record keeps the bootstrap password (sealed) until the tenant goes live.
//!
//! A run owns its `pending` record through a lease stored in the registry, so runs in
//! other processes see it too. The claim takes the lease, `resume` takes it with a
//! conditional write, and it is released when the run fails or the tenant goes live.
//! A lease older than the slowest expected run is treated as abandoned.

use chrono::{DateTime, Utc};
use nexus_core::models::{
    ApiCredentials, Plan, ProvisionRequest, ProvisionStep, ProvisionedTenant, Tenant,
    TenantStatus, TenantUpsert,
};
use nexus_core::validation::{normalize_org_name, validate_subdomain};
use nexus_core::{AppError, Config};
use std::sync::Arc;
use std::time::Duration;

use crate::availability::AvailabilityChecker;
use crate::credentials::CredentialIssuer;
use crate::executor::{SiteCreateOutcome, SiteExecutor, SiteSpec};
use crate::registry::MasterRegistry;
use crate::site_admin::{AdminUser, SiteAdmin, SiteLogin};

/// Added to the slowest expected run before its lease counts as abandoned.
const LEASE_GRACE: Duration = Duration::from_secs(300);

/// Everything one run needs after admission.
struct Run {
    subdomain: String,
    site_name: String,
    site_url: String,
    organization_name: String,
    admin_email: String,
    admin_name: String,
    admin_password: String,
    plan: Plan,
    steps: Vec<ProvisionStep>,
    warnings: Vec<String>,
}

impl Run {
    fn login(&self) -> SiteLogin {
        SiteLogin {
            site_name: self.site_name.clone(),
            administrator_password: self.admin_password.clone(),
        }
    }

    fn degraded(&self, step: ProvisionStep, error: &AppError) -> AppError {
        tracing::warn!(
            subdomain = %self.subdomain,
            step = %step,
            error = %error,
            "Site is up but provisioning bookkeeping is incomplete"
        );
        AppError::RegistryWriteFailed {
            subdomain: self.subdomain.clone(),
            site_url: self.site_url.clone(),
            step,
            message: error.to_string(),
            credentials: None,
        }
    }
}

/// Outcome of the admission checks.
enum Admission {
    Fresh(String),
    Resume(Tenant),
}

fn local_part(email: &str) -> String {
    email.split('@').next().unwrap_or("Admin").to_string()
}

#[derive(Clone)]
pub struct SiteProvisioner {
    config: Arc<Config>,
    registry: MasterRegistry,
    availability: AvailabilityChecker,
    executor: Arc<dyn SiteExecutor>,
    site_admin: Arc<dyn SiteAdmin>,
    issuer: CredentialIssuer,
}

impl SiteProvisioner {
    pub fn new(
        config: Arc<Config>,
        registry: MasterRegistry,
        executor: Arc<dyn SiteExecutor>,
        site_admin: Arc<dyn SiteAdmin>,
    ) -> Self {
        Self {
            availability: AvailabilityChecker::new(registry.clone()),
            config,
            registry,
            executor,
            site_admin,
            issuer: CredentialIssuer::new(),
        }
    }

    pub fn registry(&self) -> &MasterRegistry {
        &self.registry
    }

    /// Leases taken before this instant belong to runs that are no longer alive.
    fn lease_cutoff(&self) -> DateTime<Utc> {
        let apps = self.config.default_apps().len() as u32;
        let ttl = self.config.site_create_timeout()
            + self.config.app_install_timeout() * apps
            + LEASE_GRACE;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        Utc::now() - ttl
    }

    /// Hand the lease back after a failed run so the owner can resume right away.
    async fn settle(
        &self,
        subdomain: &str,
        result: Result<ProvisionedTenant, AppError>,
    ) -> Result<ProvisionedTenant, AppError> {
        if result.is_err() {
            if let Err(e) = self.registry.release_lease(subdomain).await {
                tracing::warn!(subdomain = %subdomain, error = %e, "Provisioning lease not released, it will expire");
            }
        }
        result
    }

    async fn admit(&self, request: &ProvisionRequest) -> Result<Admission, AppError> {
        let subdomain = normalize_org_name(&request.organization_name)?;
        validate_subdomain(&subdomain).map_err(AppError::InvalidName)?;

        if self.availability.check(&subdomain).await?.available {
            return Ok(Admission::Fresh(subdomain));
        }

        // Taken. A pending record of the same owner with no live lease is resumable.
        match self.registry.get_by_subdomain(&subdomain).await? {
            Some(existing)
                if existing.status == TenantStatus::Pending
                    && existing.owner_email.eq_ignore_ascii_case(&request.admin_email)
                    && !existing.lease_held(self.lease_cutoff()) =>
            {
                Ok(Admission::Resume(existing))
            }
            // Deleted since the check.
            None => Ok(Admission::Fresh(subdomain)),
            Some(_) => Err(AppError::SubdomainTaken(subdomain)),
        }
    }

    /// Validation and conflict checks only, so callers can fail fast before going async.
    /// Returns the subdomain the request will provision.
    pub async fn preflight(&self, request: &ProvisionRequest) -> Result<String, AppError> {
        Ok(match self.admit(request).await? {
            Admission::Fresh(subdomain) => subdomain,
            Admission::Resume(tenant) => tenant.subdomain,
        })
    }

    #[tracing::instrument(skip(self, request), fields(org = %request.organization_name, plan = %request.plan))]
    pub async fn provision(&self, request: ProvisionRequest) -> Result<ProvisionedTenant, AppError> {
        let subdomain = match self.admit(&request).await? {
            Admission::Fresh(subdomain) => subdomain,
            Admission::Resume(tenant) => {
                tracing::info!(subdomain = %tenant.subdomain, "Same owner re-entered signup, resuming pending tenant");
                return self.resume_tenant(tenant).await;
            }
        };

        let admin_password = request
            .admin_password
            .clone()
            .unwrap_or_else(|| self.issuer.generate_password());

        match self
            .registry
            .claim(
                &subdomain,
                &request.organization_name,
                &request.admin_email,
                request.plan,
                &admin_password,
            )
            .await
        {
            Ok(_) => {}
            Err(AppError::AlreadyExists(_)) => {
                tracing::info!(subdomain = %subdomain, "Lost claim race to a concurrent signup");
                return Err(AppError::SubdomainTaken(subdomain));
            }
            Err(e) => return Err(e),
        }

        let run = Run {
            site_name: self.config.site_name(&subdomain),
            site_url: self.config.site_url(&subdomain),
            subdomain: subdomain.clone(),
            organization_name: request.organization_name.clone(),
            admin_email: request.admin_email.clone(),
            admin_name: request.admin_display_name(),
            admin_password,
            plan: request.plan,
            steps: vec![
                ProvisionStep::Normalize,
                ProvisionStep::AvailabilityCheck,
                ProvisionStep::Claim,
            ],
            warnings: Vec::new(),
        };
        tracing::info!(subdomain = %run.subdomain, site = %run.site_name, "Subdomain claimed, creating site");

        let result = self.build(run).await;
        self.settle(&subdomain, result).await
    }

    async fn build(&self, mut run: Run) -> Result<ProvisionedTenant, AppError> {
        self.create_site(&mut run).await?;
        self.finish(run).await
    }

    /// Finish a `pending` tenant: reconcile the site's existence first, create it only if
    /// it is absent, then run the remaining steps.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self, subdomain: &str) -> Result<ProvisionedTenant, AppError> {
        let tenant = self
            .registry
            .get_by_subdomain(subdomain)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tenant '{}' not found", subdomain)))?;
        self.resume_tenant(tenant).await
    }

    async fn resume_tenant(&self, tenant: Tenant) -> Result<ProvisionedTenant, AppError> {
        if tenant.status != TenantStatus::Pending {
            return Err(AppError::BadRequest(format!(
                "Tenant '{}' is {}; only pending tenants can be resumed",
                tenant.subdomain, tenant.status
            )));
        }
        let subdomain = tenant.subdomain;
        let tenant = self
            .registry
            .acquire_lease(&subdomain, self.lease_cutoff())
            .await?
            .ok_or_else(|| {
                AppError::SubdomainTaken(format!("{} (provisioning in progress)", subdomain))
            })?;

        let result = self.resume_leased(tenant).await;
        self.settle(&subdomain, result).await
    }

    async fn resume_leased(&self, tenant: Tenant) -> Result<ProvisionedTenant, AppError> {
        let admin_password = self.registry.admin_password(&tenant)?.ok_or_else(|| {
            AppError::Internal(format!(
                "Pending tenant '{}' has no bootstrap password",
                tenant.subdomain
            ))
        })?;

        let mut run = Run {
            site_name: self.config.site_name(&tenant.subdomain),
            site_url: self.config.site_url(&tenant.subdomain),
            admin_name: local_part(&tenant.owner_email),
            subdomain: tenant.subdomain,
            organization_name: tenant.organization_name,
            admin_email: tenant.owner_email,
            admin_password,
            plan: tenant.plan,
            steps: vec![ProvisionStep::Claim],
            warnings: Vec::new(),
        };

        match self.executor.site_exists(&run.site_name).await {
            Ok(true) => {
                tracing::info!(site = %run.site_name, "Site already exists, skipping creation");
                run.steps.push(ProvisionStep::SiteCreation);
            }
            Ok(false) => self.create_site(&mut run).await?,
            Err(e) => {
                return Err(AppError::SiteCreationUnknown {
                    subdomain: run.subdomain,
                    message: format!("could not check for an existing site: {}", e),
                })
            }
        }
        self.finish(run).await
    }

    async fn create_site(&self, run: &mut Run) -> Result<(), AppError> {
        let spec = SiteSpec {
            site_name: run.site_name.clone(),
            admin_password: run.admin_password.clone(),
        };

        match self.executor.create_site(&spec).await {
            SiteCreateOutcome::Created => {}
            SiteCreateOutcome::AlreadyExists => {
                tracing::warn!(site = %run.site_name, "Site already existed on the backend, continuing");
            }
            SiteCreateOutcome::Failed(message) => {
                tracing::error!(subdomain = %run.subdomain, error = %message, "Site creation failed");
                if let Err(e) = self.executor.drop_site(&run.site_name).await {
                    tracing::warn!(site = %run.site_name, error = %e, "Cleanup of partial site failed");
                }
                return Err(AppError::SiteCreationFailed {
                    subdomain: run.subdomain.clone(),
                    message,
                });
            }
            SiteCreateOutcome::Unknown(message) => {
                tracing::warn!(subdomain = %run.subdomain, error = %message, "Site creation outcome unknown, reconciling");
                match self.executor.site_exists(&run.site_name).await {
                    Ok(true) => {
                        tracing::info!(site = %run.site_name, "Site exists after interrupted creation");
                    }
                    Ok(false) | Err(_) => {
                        return Err(AppError::SiteCreationUnknown {
                            subdomain: run.subdomain.clone(),
                            message,
                        });
                    }
                }
            }
        }

        run.steps.push(ProvisionStep::SiteCreation);
        Ok(())
    }

    async fn finish(&self, mut run: Run) -> Result<ProvisionedTenant, AppError> {
        let mut apps_ok = true;
        for app in self.config.default_apps() {
            if let Err(e) = self.executor.install_app(&run.site_name, app).await {
                tracing::warn!(site = %run.site_name, app = %app, error = %e, "App install failed");
                run.warnings.push(format!("App '{}' was not installed: {}", app, e));
                apps_ok = false;
            }
        }
        if apps_ok {
            run.steps.push(ProvisionStep::AppInstall);
        }

        let login = run.login();
        let admin = AdminUser {
            email: run.admin_email.clone(),
            first_name: run.admin_name.clone(),
            password: run.admin_password.clone(),
        };
        if let Err(e) = self.site_admin.ensure_admin_user(&login, &admin).await {
            return Err(run.degraded(ProvisionStep::AdminUser, &e));
        }
        run.steps.push(ProvisionStep::AdminUser);

        let credentials = self.issuer.issue();
        if let Err(e) = self
            .site_admin
            .set_api_credentials(&login, &run.admin_email, &credentials)
            .await
        {
            return Err(run.degraded(ProvisionStep::Credentials, &e));
        }
        run.steps.push(ProvisionStep::Credentials);

        match self
            .site_admin
            .apply_plan_settings(&login, &run.organization_name, run.plan)
            .await
        {
            Ok(()) => run.steps.push(ProvisionStep::PlanSettings),
            Err(e) => {
                tracing::warn!(site = %run.site_name, error = %e, "Plan settings not applied");
                run.warnings.push(format!("Plan settings were not applied: {}", e));
            }
        }

        let upsert = TenantUpsert {
            organization_name: Some(run.organization_name.clone()),
            owner_email: Some(run.admin_email.clone()),
            status: Some(TenantStatus::Active),
            plan: Some(run.plan),
            site_url: Some(run.site_url.clone()),
            credentials: Some(credentials.clone()),
        };
        let tenant = match self.registry.upsert_tenant(&run.subdomain, upsert).await {
            Ok((tenant, _)) => tenant,
            Err(e) => return Err(run.degraded(ProvisionStep::RegistryUpsert, &e)),
        };
        run.steps.push(ProvisionStep::RegistryUpsert);

        if self.config.setup_nginx() {
            match self.executor.reload_proxy().await {
                Ok(()) => run.steps.push(ProvisionStep::ProxyReload),
                Err(e) => {
                    tracing::warn!(error = %e, "Proxy reload failed");
                    run.warnings.push(format!("Proxy reload failed: {}", e));
                }
            }
        }

        tracing::info!(
            subdomain = %run.subdomain,
            site_url = %run.site_url,
            warnings = run.warnings.len(),
            "Tenant provisioned"
        );

        let ApiCredentials { api_key, api_secret } = credentials;
        Ok(ProvisionedTenant {
            subdomain: run.subdomain,
            site_name: run.site_name,
            site_url: run.site_url,
            api_key,
            api_secret,
            admin_password: run.admin_password,
            plan: run.plan,
            status: tenant.status,
            steps_completed: run.steps,
            warnings: run.warnings,
        })
    }

    /// Issue a new API pair for a live tenant: site user first, then one registry write
    /// that replaces key and secret together.
    ///
    /// If the registry write fails the site is rolled back to the current pair and the
    /// error is returned as is, so a plain retry works. If the rollback fails too, the
    /// degraded error carries the new pair for the caller to report.
    #[tracing::instrument(skip(self))]
    pub async fn rotate(&self, subdomain: &str) -> Result<ApiCredentials, AppError> {
        let tenant = self
            .registry
            .get_by_subdomain(subdomain)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tenant '{}' not found", subdomain)))?;
        let current = self.registry.credentials(&tenant)?.ok_or_else(|| {
            AppError::BadRequest(format!("Tenant '{}' has no credentials to rotate", subdomain))
        })?;

        let replacement = self.issuer.issue();
        let site_name = self.config.site_name(subdomain);
        self.site_admin
            .rotate_api_credentials(&site_name, &tenant.owner_email, &current, &replacement)
            .await?;

        if let Err(e) = self.registry.rotate_credentials(subdomain, &replacement).await {
            if self.registry_holds(subdomain, &replacement).await {
                tracing::info!(subdomain = %subdomain, "Registry write reported failure but landed");
                return Ok(replacement);
            }
            tracing::warn!(subdomain = %subdomain, error = %e, "Registry write failed, rolling the site back");
            let rollback = self
                .site_admin
                .rotate_api_credentials(&site_name, &tenant.owner_email, &replacement, &current)
                .await;
            return Err(match rollback {
                Ok(()) => e,
                Err(rollback_error) => {
                    tracing::error!(
                        subdomain = %subdomain,
                        error = %rollback_error,
                        "Site holds the new pair but the registry does not"
                    );
                    AppError::RegistryWriteFailed {
                        subdomain: subdomain.to_string(),
                        site_url: tenant
                            .site_url
                            .clone()
                            .unwrap_or_else(|| self.config.site_url(subdomain)),
                        step: ProvisionStep::Credentials,
                        message: e.to_string(),
                        credentials: Some(replacement),
                    }
                }
            });
        }

        tracing::info!(subdomain = %subdomain, "Credentials rotated");
        Ok(replacement)
    }

    async fn registry_holds(&self, subdomain: &str, credentials: &ApiCredentials) -> bool {
        match self.registry.get_by_subdomain(subdomain).await {
            Ok(Some(tenant)) => matches!(
                self.registry.credentials(&tenant),
                Ok(Some(ref stored)) if stored == credentials
            ),
            _ => false,
        }
    }
}
