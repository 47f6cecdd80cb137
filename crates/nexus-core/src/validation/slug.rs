//! Subdomain slug normalization and validation
//!
//! `normalize_org_name` turns a display name into the canonical subdomain key:
//! lowercase, every character outside `[a-z0-9]` replaced by `-`, runs of `-` collapsed,
//! leading/trailing `-` stripped. It is pure and idempotent.

use regex::Regex;

use crate::AppError;

pub const MIN_SUBDOMAIN_LENGTH: usize = 3;
/// DNS label limit.
pub const MAX_SUBDOMAIN_LENGTH: usize = 63;

/// Subdomains that collide with infrastructure hosts and can never be assigned.
pub const RESERVED_SUBDOMAINS: &[&str] = &[
    "api",
    "www",
    "admin",
    "app",
    "mail",
    "smtp",
    "ftp",
    "master",
    "erp",
    "localhost",
    "status",
    "docs",
    "static",
    "assets",
    "support",
    "billing",
    "dashboard",
    "provisioning",
];

/// Normalize an organization name into a subdomain candidate.
///
/// Fails with `AppError::InvalidName` when fewer than 3 characters survive.
pub fn normalize_org_name(name: &str) -> Result<String, AppError> {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug = slug.trim_matches('-').to_string();
    if slug.len() > MAX_SUBDOMAIN_LENGTH {
        slug.truncate(MAX_SUBDOMAIN_LENGTH);
        slug = slug.trim_end_matches('-').to_string();
    }

    if slug.len() < MIN_SUBDOMAIN_LENGTH {
        return Err(AppError::InvalidName(format!(
            "Organization name '{}' must contain at least {} letters or digits",
            name.trim(),
            MIN_SUBDOMAIN_LENGTH
        )));
    }

    Ok(slug)
}

pub fn is_reserved_subdomain(subdomain: &str) -> bool {
    RESERVED_SUBDOMAINS.contains(&subdomain)
}

/// Check that a candidate is a well-formed, assignable subdomain.
///
/// Returns the rejection reason on failure.
pub fn validate_subdomain(subdomain: &str) -> Result<(), String> {
    if subdomain.len() < MIN_SUBDOMAIN_LENGTH {
        return Err(format!(
            "Subdomain must be at least {} characters",
            MIN_SUBDOMAIN_LENGTH
        ));
    }
    if subdomain.len() > MAX_SUBDOMAIN_LENGTH {
        return Err(format!(
            "Subdomain must be at most {} characters",
            MAX_SUBDOMAIN_LENGTH
        ));
    }

    let pattern = Regex::new(r"^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$")
        .map_err(|e| format!("Failed to compile subdomain validation regex: {}", e))?;
    if !pattern.is_match(subdomain) || subdomain.contains("--") {
        return Err(format!(
            "Subdomain '{}' may only contain lowercase letters, digits, and single hyphens",
            subdomain
        ));
    }

    if is_reserved_subdomain(subdomain) {
        return Err(format!("Subdomain '{}' is reserved", subdomain));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_punctuation_and_case() {
        assert_eq!(normalize_org_name("Acme Corp!!").unwrap(), "acme-corp");
        assert_eq!(normalize_org_name("  ---Test---  ").unwrap(), "test");
        assert_eq!(normalize_org_name("Foo & Bar, Inc.").unwrap(), "foo-bar-inc");
        assert_eq!(normalize_org_name("R2D2 Droids").unwrap(), "r2d2-droids");
    }

    #[test]
    fn rejects_short_names() {
        assert!(matches!(
            normalize_org_name("ab"),
            Err(AppError::InvalidName(_))
        ));
        assert!(matches!(
            normalize_org_name("!!!"),
            Err(AppError::InvalidName(_))
        ));
        assert!(matches!(normalize_org_name(""), Err(AppError::InvalidName(_))));
        assert!(matches!(
            normalize_org_name("a-b"),
            Err(AppError::InvalidName(_))
        ));
    }

    #[test]
    fn non_ascii_letters_become_separators() {
        assert_eq!(normalize_org_name("Café Zürich").unwrap(), "caf-z-rich");
    }

    #[test]
    fn is_idempotent() {
        let names = vec![
            "Acme Corp!!".to_string(),
            "  ---Test---  ".to_string(),
            "Über GmbH & Co. KG".to_string(),
            "123 Main Street".to_string(),
            "a   b   c   d".to_string(),
            "___Leading_and_trailing___".to_string(),
            "x".repeat(100),
            "ab-".repeat(40),
        ];
        for name in &names {
            let once = normalize_org_name(name).unwrap();
            let twice = normalize_org_name(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {:?}", name);
        }
    }

    #[test]
    fn truncates_to_dns_label_length() {
        let slug = normalize_org_name(&"ab-".repeat(40)).unwrap();
        assert!(slug.len() <= MAX_SUBDOMAIN_LENGTH);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn normalized_output_is_valid_unless_reserved() {
        let slug = normalize_org_name("Acme Corp!!").unwrap();
        assert!(validate_subdomain(&slug).is_ok());

        let reserved = normalize_org_name("API").unwrap();
        assert!(validate_subdomain(&reserved)
            .unwrap_err()
            .contains("reserved"));
    }

    #[test]
    fn validate_subdomain_rejects_malformed() {
        assert!(validate_subdomain("ab").is_err());
        assert!(validate_subdomain("-acme").is_err());
        assert!(validate_subdomain("acme-").is_err());
        assert!(validate_subdomain("ac--me").is_err());
        assert!(validate_subdomain("Acme").is_err());
        assert!(validate_subdomain("acme.corp").is_err());
        assert!(validate_subdomain(&"a".repeat(64)).is_err());
        assert!(validate_subdomain("www").is_err());
        assert!(validate_subdomain("acme-corp").is_ok());
    }
}
