//! Error types module
//!
//! This module provides the error taxonomy used throughout the provisioning control plane.
//! All errors are unified under the `AppError` enum: validation and conflict errors that are
//! returned synchronously, transient registry failures, executor outcomes, and the degraded
//! "site up, registry incomplete" result.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

use crate::models::{ApiCredentials, ProvisionStep, TenantStatus};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues and degraded results
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their HTTP response characteristics
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "SUBDOMAIN_TAKEN")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid organization name: {0}")]
    InvalidName(String),

    #[error("Subdomain already taken: {0}")]
    SubdomainTaken(String),

    /// Uniqueness sentinel raised by registry stores when a create collides with an existing key.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Availability check failed: {0}")]
    CheckFailed(String),

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Site creation failed for {subdomain}: {message}")]
    SiteCreationFailed { subdomain: String, message: String },

    #[error("Site creation outcome unknown for {subdomain}: {message}")]
    SiteCreationUnknown { subdomain: String, message: String },

    #[error("Site {subdomain} is up but step {step} failed: {message}")]
    RegistryWriteFailed {
        subdomain: String,
        site_url: String,
        step: ProvisionStep,
        message: String,
        /// Pair the site holds but the registry does not, when one was issued.
        credentials: Option<ApiCredentials>,
    },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: TenantStatus, to: TenantStatus },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidName(_) => (
            400,
            "INVALID_NAME",
            false,
            Some("Use at least 3 letters or digits in the organization name"),
            false,
            LogLevel::Debug,
        ),
        AppError::SubdomainTaken(_) => (
            409,
            "SUBDOMAIN_TAKEN",
            false,
            Some("Choose a different organization name"),
            false,
            LogLevel::Debug,
        ),
        AppError::AlreadyExists(_) => (
            409,
            "ALREADY_EXISTS",
            false,
            Some("Read the existing record instead of creating it"),
            false,
            LogLevel::Debug,
        ),
        AppError::CheckFailed(_) => (
            503,
            "CHECK_FAILED",
            true,
            Some("Retry the availability check after a short delay"),
            false,
            LogLevel::Warn,
        ),
        AppError::RegistryUnavailable(_) => (
            503,
            "REGISTRY_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::SiteCreationFailed { .. } => (
            502,
            "SITE_CREATION_FAILED",
            true,
            Some("Retry provisioning; no site was left behind"),
            true,
            LogLevel::Error,
        ),
        AppError::SiteCreationUnknown { .. } => (
            504,
            "SITE_CREATION_UNKNOWN",
            true,
            Some("Resume the tenant to reconcile before retrying"),
            true,
            LogLevel::Error,
        ),
        AppError::RegistryWriteFailed {
            credentials: Some(_),
            ..
        } => (
            207,
            "REGISTRY_WRITE_FAILED",
            true,
            Some("The site holds the returned API pair; report it via /tenant/update-credentials"),
            false,
            LogLevel::Warn,
        ),
        AppError::RegistryWriteFailed { .. } => (
            207,
            "REGISTRY_WRITE_FAILED",
            true,
            Some("Site is up; resume the tenant to finish registration"),
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidStatusTransition { .. } => (
            409,
            "INVALID_STATUS_TRANSITION",
            false,
            Some("Check the tenant's current status"),
            false,
            LogLevel::Debug,
        ),
        AppError::Timeout(_) => (
            504,
            "TIMEOUT",
            true,
            Some("Poll the provisioning status; the operation may still complete"),
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::BadRequest(_) => (
            400,
            "BAD_REQUEST",
            false,
            Some("Check request format and parameters"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the tenant subdomain exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Unauthorized(_) => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Check the provisioning secret header"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::InvalidName(_) => "InvalidName",
            AppError::SubdomainTaken(_) => "SubdomainTaken",
            AppError::AlreadyExists(_) => "AlreadyExists",
            AppError::CheckFailed(_) => "CheckFailed",
            AppError::RegistryUnavailable(_) => "RegistryUnavailable",
            AppError::SiteCreationFailed { .. } => "SiteCreationFailed",
            AppError::SiteCreationUnknown { .. } => "SiteCreationUnknown",
            AppError::RegistryWriteFailed { .. } => "RegistryWriteFailed",
            AppError::InvalidStatusTransition { .. } => "InvalidStatusTransition",
            AppError::Timeout(_) => "Timeout",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::BadRequest(_) => "BadRequest",
            AppError::NotFound(_) => "NotFound",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// True for the "site exists but bookkeeping is incomplete" result.
    pub fn is_degraded(&self) -> bool {
        matches!(self, AppError::RegistryWriteFailed { .. })
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access the tenant registry".to_string(),
            AppError::InvalidName(ref msg) => msg.clone(),
            AppError::SubdomainTaken(ref subdomain) => {
                format!("Subdomain '{}' is already taken", subdomain)
            }
            AppError::AlreadyExists(ref key) => format!("'{}' already exists", key),
            AppError::CheckFailed(_) => {
                "Could not verify subdomain availability, please retry".to_string()
            }
            AppError::RegistryUnavailable(_) => "Tenant registry is unavailable".to_string(),
            AppError::SiteCreationFailed { subdomain, .. } => {
                format!("Failed to create workspace '{}'", subdomain)
            }
            AppError::SiteCreationUnknown { subdomain, .. } => format!(
                "Workspace '{}' creation was interrupted; its state must be reconciled",
                subdomain
            ),
            AppError::RegistryWriteFailed { subdomain, step, .. } => format!(
                "Workspace '{}' was created but {} did not complete",
                subdomain, step
            ),
            AppError::InvalidStatusTransition { from, to } => {
                format!("Cannot move tenant from {} to {}", from, to)
            }
            AppError::Timeout(ref msg) => msg.clone(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::BadRequest(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Unauthorized(ref msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}
