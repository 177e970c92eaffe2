//! Credential lifecycle management for third-party storage providers.

pub mod manager;

pub use manager::{CredentialManager, CredentialStore};
