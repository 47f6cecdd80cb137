pub mod tenant;

pub use tenant::PgTenantStore;
