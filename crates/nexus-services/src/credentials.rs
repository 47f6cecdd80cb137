//! Per-tenant API credential and bootstrap password generation
//!
//! Generation only; persisting a pair is the master registry's job.

use base64::{engine::general_purpose, Engine as _};
use nexus_core::models::ApiCredentials;
use rand::Rng;

/// Random bytes behind each API key (hex encoded, 30 chars).
const API_KEY_BYTES: usize = 15;
/// Random bytes behind each API secret (base64url, 32 chars).
const API_SECRET_BYTES: usize = 24;
/// Random bytes behind generated admin passwords (base64url, 24 chars).
const PASSWORD_BYTES: usize = 18;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random()).collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialIssuer;

impl CredentialIssuer {
    pub fn new() -> Self {
        Self
    }

    /// A fresh, never-reused API key/secret pair.
    pub fn issue(&self) -> ApiCredentials {
        ApiCredentials {
            api_key: hex::encode(random_bytes(API_KEY_BYTES)),
            api_secret: general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(API_SECRET_BYTES)),
        }
    }

    /// Password for a site's Administrator and admin user when the caller supplies none.
    pub fn generate_password(&self) -> String {
        general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(PASSWORD_BYTES))
    }
}
