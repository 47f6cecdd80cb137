//! ERP backend integration: the RPC client and the `SaaS Tenant` registry store.

pub mod client;
pub mod registry;

pub use client::{ErpAuth, ErpClient, ErpError};
pub use registry::{ErpTenantStore, TENANT_DOCTYPE};
