//! Subdomain availability
//!
//! Malformed and reserved names are rejected before the registry is consulted. A failed
//! registry read is `CheckFailed`, never "taken".

use nexus_core::models::SubdomainAvailability;
use nexus_core::validation::{normalize_org_name, validate_subdomain};
use nexus_core::AppError;

use crate::registry::MasterRegistry;

#[derive(Clone)]
pub struct AvailabilityChecker {
    registry: MasterRegistry,
}

impl AvailabilityChecker {
    pub fn new(registry: MasterRegistry) -> Self {
        Self { registry }
    }

    /// Check a candidate that is already in canonical form.
    #[tracing::instrument(skip(self))]
    pub async fn check(&self, subdomain: &str) -> Result<SubdomainAvailability, AppError> {
        if let Err(reason) = validate_subdomain(subdomain) {
            return Ok(SubdomainAvailability {
                subdomain: Some(subdomain.to_string()),
                ..SubdomainAvailability::rejected(reason)
            });
        }

        match self.registry.get_by_subdomain(subdomain).await {
            Ok(Some(existing)) => {
                tracing::debug!(status = %existing.status, "Subdomain taken");
                Ok(SubdomainAvailability::taken(subdomain))
            }
            Ok(None) => Ok(SubdomainAvailability::available(subdomain)),
            Err(e) => {
                tracing::warn!(error = %e, "Availability lookup failed");
                Err(AppError::CheckFailed(e.to_string()))
            }
        }
    }

    /// Normalize free-form input (an organization name or a typed subdomain), then check it.
    pub async fn check_name(&self, input: &str) -> Result<SubdomainAvailability, AppError> {
        match normalize_org_name(input) {
            Ok(subdomain) => self.check(&subdomain).await,
            Err(AppError::InvalidName(reason)) => Ok(SubdomainAvailability::rejected(reason)),
            Err(e) => Err(e),
        }
    }
}
