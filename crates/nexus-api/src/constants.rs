//! API constants

/// Shared-secret header required on every provisioning endpoint.
pub const PROVISIONING_SECRET_HEADER: &str = "X-Provisioning-Secret";

/// Path pollers use for readiness checks.
pub const PROVISIONING_STATUS_PATH: &str = "/provisioning-status";

/// Extra time, beyond the site creation timeout, that shutdown waits for in-flight runs.
pub const SHUTDOWN_GRACE_MARGIN_SECS: u64 = 60;
