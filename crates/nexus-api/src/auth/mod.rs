//! Shared-secret authentication for the provisioning surface.

pub mod middleware;

pub use middleware::{provisioning_auth_middleware, AuthState};
