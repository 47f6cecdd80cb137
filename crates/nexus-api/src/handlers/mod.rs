//! HTTP handlers for the provisioning surface.

pub mod credentials;
pub mod provision;
pub mod provisioning_status;
pub mod subdomain;
pub mod tenants;
