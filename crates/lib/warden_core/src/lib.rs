//! # warden_core
//!
//! Core authentication and authorization logic for Warden: credential
//! verification, token lifecycle and role-based permission resolution.

pub mod auth;
pub mod config;
pub mod migrate;
pub mod models;
pub mod store;

pub use auth::engine::AuthEngine;
pub use auth::{AuthError, AuthResult};
pub use config::{AuthConfig, ConfigError};
pub use store::Stores;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
