//! Data models for the application
//!
//! Tenant registry records, plans, and the request/response shapes of the provisioning
//! pipeline. Each sub-module represents a specific feature area.

mod plan;
mod provisioning;
mod tenant;

// Re-export all models for convenient imports
pub use plan::*;
pub use provisioning::*;
pub use tenant::*;
