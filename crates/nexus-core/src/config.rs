//! Configuration module
//!
//! The control plane reads its environment exactly once, in `Config::from_env`, and the
//! resulting value is passed into every component. Nothing downstream reads process
//! environment variables.

use base64::{engine::general_purpose, Engine as _};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::polling::PollPolicy;

// Common constants
const SERVER_PORT: u16 = 8001;
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const HTTP_CONCURRENCY_LIMIT: usize = 1024;
const ROOT_DOMAIN: &str = "avariq.in";
const ERP_URL: &str = "http://localhost:8000";
const MASTER_SITE_NAME: &str = "erp.localhost";
const BACKEND_CONTAINER: &str = "frappe_docker-backend-1";
const BENCH_PATH: &str = "/home/frappe/frappe-bench";
const DEFAULT_APPS: &str = "nexus_core";
const SITE_CREATE_TIMEOUT_SECS: u64 = 300;
const APP_INSTALL_TIMEOUT_SECS: u64 = 120;
const STATUS_POLL_INTERVAL_SECS: u64 = 5;
const STATUS_POLL_TIMEOUT_SECS: u64 = 300;
const SYNC_PROVISION_TIMEOUT_SECS: u64 = 600;
const MIN_PROVISIONING_SECRET_LENGTH: usize = 32;

/// Where the master registry lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegistryBackend {
    /// `tenants` table in the control-plane PostgreSQL database.
    #[default]
    Postgres,
    /// `SaaS Tenant` doctype on the ERP master site.
    Erp,
}

impl FromStr for RegistryBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(RegistryBackend::Postgres),
            "erp" | "frappe" => Ok(RegistryBackend::Erp),
            other => Err(anyhow::anyhow!(
                "REGISTRY_BACKEND must be 'postgres' or 'erp', got '{}'",
                other
            )),
        }
    }
}

/// HTTP server settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub http_concurrency_limit: usize,
    /// `compact` (default) or `json`
    pub log_format: String,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            cors_origins: vec!["*".to_string()],
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            environment: "development".to_string(),
            http_concurrency_limit: HTTP_CONCURRENCY_LIMIT,
            log_format: "compact".to_string(),
        }
    }
}

/// Provisioning control-plane configuration
#[derive(Clone)]
pub struct ProvisionerConfig {
    pub base: BaseConfig,
    pub registry_backend: RegistryBackend,
    pub database_url: Option<String>,
    pub root_domain: String,
    // ERP backend RPC
    pub erp_url: String,
    pub master_site_name: String,
    pub erp_api_key: Option<String>,
    pub erp_api_secret: Option<String>,
    // Site-creation executor
    pub backend_container: String,
    pub bench_path: String,
    pub db_root_password: String,
    pub default_apps: Vec<String>,
    pub site_create_timeout_secs: u64,
    pub app_install_timeout_secs: u64,
    pub setup_nginx: bool,
    // Secrets
    pub provisioning_api_secret: String,
    /// Base64-encoded 32-byte AES key for secrets at rest.
    pub encryption_key: String,
    // Status polling
    pub status_poll_interval_secs: u64,
    pub status_poll_timeout_secs: u64,
    pub sync_provision_timeout_secs: u64,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            base: BaseConfig::default(),
            registry_backend: RegistryBackend::Postgres,
            database_url: None,
            root_domain: ROOT_DOMAIN.to_string(),
            erp_url: ERP_URL.to_string(),
            master_site_name: MASTER_SITE_NAME.to_string(),
            erp_api_key: None,
            erp_api_secret: None,
            backend_container: BACKEND_CONTAINER.to_string(),
            bench_path: BENCH_PATH.to_string(),
            db_root_password: String::new(),
            default_apps: vec![DEFAULT_APPS.to_string()],
            site_create_timeout_secs: SITE_CREATE_TIMEOUT_SECS,
            app_install_timeout_secs: APP_INSTALL_TIMEOUT_SECS,
            setup_nginx: false,
            provisioning_api_secret: String::new(),
            encryption_key: String::new(),
            status_poll_interval_secs: STATUS_POLL_INTERVAL_SECS,
            status_poll_timeout_secs: STATUS_POLL_TIMEOUT_SECS,
            sync_provision_timeout_secs: SYNC_PROVISION_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for ProvisionerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("ProvisionerConfig")
            .field("base", &self.base)
            .field("registry_backend", &self.registry_backend)
            .field("database_url", &self.database_url.as_ref().map(|_| REDACTED))
            .field("root_domain", &self.root_domain)
            .field("erp_url", &self.erp_url)
            .field("master_site_name", &self.master_site_name)
            .field("erp_api_key", &self.erp_api_key)
            .field("erp_api_secret", &self.erp_api_secret.as_ref().map(|_| REDACTED))
            .field("backend_container", &self.backend_container)
            .field("bench_path", &self.bench_path)
            .field("db_root_password", &REDACTED)
            .field("default_apps", &self.default_apps)
            .field("site_create_timeout_secs", &self.site_create_timeout_secs)
            .field("app_install_timeout_secs", &self.app_install_timeout_secs)
            .field("setup_nginx", &self.setup_nginx)
            .field("provisioning_api_secret", &REDACTED)
            .field("encryption_key", &REDACTED)
            .field("status_poll_interval_secs", &self.status_poll_interval_secs)
            .field("status_poll_timeout_secs", &self.status_poll_timeout_secs)
            .field(
                "sync_provision_timeout_secs",
                &self.sync_provision_timeout_secs,
            )
            .finish()
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<ProvisionerConfig>);

impl Config {
    fn as_provisioner(&self) -> &ProvisionerConfig {
        &self.0
    }

    pub fn new(config: ProvisionerConfig) -> Self {
        Config(Box::new(config))
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_environment(&self.as_provisioner().base.environment)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = ProvisionerConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_provisioner().validate()
    }

    /// Host name of a tenant site: `{subdomain}.{root_domain}` in production, `{subdomain}.localhost` otherwise.
    pub fn site_name(&self, subdomain: &str) -> String {
        if self.is_production() {
            format!("{}.{}", subdomain, self.root_domain())
        } else {
            format!("{}.localhost", subdomain)
        }
    }

    pub fn site_url(&self, subdomain: &str) -> String {
        let scheme = if self.is_production() { "https" } else { "http" };
        format!("{}://{}", scheme, self.site_name(subdomain))
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.as_provisioner().status_poll_interval_secs),
            Duration::from_secs(self.as_provisioner().status_poll_timeout_secs),
        )
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.as_provisioner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_provisioner().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.as_provisioner().base.environment
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_provisioner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_provisioner().base.db_timeout_seconds
    }

    pub fn http_concurrency_limit(&self) -> usize {
        self.as_provisioner().base.http_concurrency_limit
    }

    pub fn log_format(&self) -> &str {
        &self.as_provisioner().base.log_format
    }

    pub fn registry_backend(&self) -> RegistryBackend {
        self.as_provisioner().registry_backend
    }

    pub fn database_url(&self) -> Option<&str> {
        self.as_provisioner().database_url.as_deref()
    }

    pub fn root_domain(&self) -> &str {
        &self.as_provisioner().root_domain
    }

    pub fn erp_url(&self) -> &str {
        &self.as_provisioner().erp_url
    }

    pub fn master_site_name(&self) -> &str {
        &self.as_provisioner().master_site_name
    }

    pub fn erp_api_key(&self) -> Option<&str> {
        self.as_provisioner().erp_api_key.as_deref()
    }

    pub fn erp_api_secret(&self) -> Option<&str> {
        self.as_provisioner().erp_api_secret.as_deref()
    }

    pub fn backend_container(&self) -> &str {
        &self.as_provisioner().backend_container
    }

    pub fn bench_path(&self) -> &str {
        &self.as_provisioner().bench_path
    }

    pub fn db_root_password(&self) -> &str {
        &self.as_provisioner().db_root_password
    }

    pub fn default_apps(&self) -> &[String] {
        &self.as_provisioner().default_apps
    }

    pub fn site_create_timeout(&self) -> Duration {
        Duration::from_secs(self.as_provisioner().site_create_timeout_secs)
    }

    pub fn app_install_timeout(&self) -> Duration {
        Duration::from_secs(self.as_provisioner().app_install_timeout_secs)
    }

    pub fn setup_nginx(&self) -> bool {
        self.as_provisioner().setup_nginx
    }

    pub fn provisioning_api_secret(&self) -> &str {
        &self.as_provisioner().provisioning_api_secret
    }

    pub fn encryption_key(&self) -> &str {
        &self.as_provisioner().encryption_key
    }

    pub fn sync_provision_timeout(&self) -> Duration {
        Duration::from_secs(self.as_provisioner().sync_provision_timeout_secs)
    }
}

fn is_production_environment(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl ProvisionerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());
        let is_production = is_production_environment(&environment);

        let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .or_else(|_| env::var("PROVISIONING_PORT"))
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            environment: environment.clone(),
            http_concurrency_limit: env_or("HTTP_CONCURRENCY_LIMIT", HTTP_CONCURRENCY_LIMIT)
                .max(1),
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "compact".to_string())
                .to_lowercase(),
        };

        let registry_backend = match env_non_empty("REGISTRY_BACKEND") {
            Some(value) => value.parse()?,
            None => RegistryBackend::default(),
        };

        let default_apps = env::var("DEFAULT_APPS")
            .unwrap_or_else(|_| DEFAULT_APPS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = ProvisionerConfig {
            base,
            registry_backend,
            database_url: env_non_empty("DATABASE_URL"),
            root_domain: env::var("ROOT_DOMAIN")
                .or_else(|_| env::var("PARENT_DOMAIN"))
                .unwrap_or_else(|_| ROOT_DOMAIN.to_string()),
            erp_url: env::var("ERP_URL")
                .unwrap_or_else(|_| ERP_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            master_site_name: env::var("MASTER_SITE_NAME")
                .unwrap_or_else(|_| MASTER_SITE_NAME.to_string()),
            erp_api_key: env_non_empty("ERP_API_KEY"),
            erp_api_secret: env_non_empty("ERP_API_SECRET"),
            backend_container: env::var("BACKEND_CONTAINER")
                .unwrap_or_else(|_| BACKEND_CONTAINER.to_string()),
            bench_path: env::var("BENCH_PATH").unwrap_or_else(|_| BENCH_PATH.to_string()),
            db_root_password: env::var("DB_ROOT_PASSWORD").unwrap_or_default(),
            default_apps,
            site_create_timeout_secs: env_or("SITE_CREATE_TIMEOUT_SECS", SITE_CREATE_TIMEOUT_SECS),
            app_install_timeout_secs: env_or("APP_INSTALL_TIMEOUT_SECS", APP_INSTALL_TIMEOUT_SECS),
            setup_nginx: env_or("SETUP_NGINX", is_production),
            provisioning_api_secret: env::var("PROVISIONING_API_SECRET").unwrap_or_default(),
            encryption_key: env::var("ENCRYPTION_KEY").unwrap_or_default(),
            status_poll_interval_secs: env_or(
                "STATUS_POLL_INTERVAL_SECS",
                STATUS_POLL_INTERVAL_SECS,
            ),
            status_poll_timeout_secs: env_or("STATUS_POLL_TIMEOUT_SECS", STATUS_POLL_TIMEOUT_SECS),
            sync_provision_timeout_secs: env_or(
                "SYNC_PROVISION_TIMEOUT_SECS",
                SYNC_PROVISION_TIMEOUT_SECS,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let is_production = is_production_environment(&self.base.environment);

        if is_production && self.base.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if self.provisioning_api_secret.is_empty() {
            return Err(anyhow::anyhow!(
                "PROVISIONING_API_SECRET must be set to protect the provisioning endpoints"
            ));
        }
        if is_production && self.provisioning_api_secret.len() < MIN_PROVISIONING_SECRET_LENGTH {
            return Err(anyhow::anyhow!(
                "PROVISIONING_API_SECRET must be at least {} characters long in production",
                MIN_PROVISIONING_SECRET_LENGTH
            ));
        }

        if self.db_root_password.is_empty() {
            return Err(anyhow::anyhow!(
                "DB_ROOT_PASSWORD must be set for site creation"
            ));
        }

        let key_bytes = general_purpose::STANDARD
            .decode(self.encryption_key.trim())
            .map_err(|e| anyhow::anyhow!("ENCRYPTION_KEY must be valid base64: {}", e))?;
        if key_bytes.len() != 32 {
            return Err(anyhow::anyhow!(
                "ENCRYPTION_KEY must decode to exactly 32 bytes"
            ));
        }

        match self.registry_backend {
            RegistryBackend::Postgres => match self.database_url.as_deref() {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                Some(_) => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
                None => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be set when using the postgres registry backend"
                    ))
                }
            },
            RegistryBackend::Erp => {
                if self.erp_api_key.is_none() || self.erp_api_secret.is_none() {
                    return Err(anyhow::anyhow!(
                        "ERP_API_KEY and ERP_API_SECRET must be set when using the erp registry backend"
                    ));
                }
            }
        }

        if self.status_poll_interval_secs == 0
            || self.status_poll_interval_secs > self.status_poll_timeout_secs
        {
            return Err(anyhow::anyhow!(
                "STATUS_POLL_INTERVAL_SECS must be positive and not exceed STATUS_POLL_TIMEOUT_SECS"
            ));
        }

        if self.site_create_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "SITE_CREATE_TIMEOUT_SECS must be positive"
            ));
        }

        Ok(())
    }
}
