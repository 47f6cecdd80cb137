//! Validation modules

pub mod slug;

pub use slug::{
    is_reserved_subdomain, normalize_org_name, validate_subdomain, MAX_SUBDOMAIN_LENGTH,
    MIN_SUBDOMAIN_LENGTH, RESERVED_SUBDOMAINS,
};
