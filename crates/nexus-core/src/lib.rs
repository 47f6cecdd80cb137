//! Nexus Core Library
//!
//! This crate provides domain models, error types, configuration, slug validation, and
//! the status polling state machine shared by all Nexus provisioning components.

pub mod config;
pub mod encryption;
pub mod error;
pub mod models;
pub mod polling;
pub mod validation;

// Re-export commonly used types
pub use config::{BaseConfig, Config, ProvisionerConfig, RegistryBackend};
pub use encryption::EncryptionService;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use polling::{wait_for_ready, PollPolicy, PollState, StatusSource};
