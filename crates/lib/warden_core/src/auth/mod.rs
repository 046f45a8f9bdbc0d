//! Authentication and authorization logic.
//!
//! Provides password hashing, JWT management, permission resolution and the
//! engine composing them over the stores.

pub mod engine;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod validation;

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Generic message for every credential failure: unknown email, wrong
/// password, inactive or locked account.
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";
pub const INVALID_TOKEN: &str = "Invalid token";

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Deployment fault (e.g. no default role provisioned). Not retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub(crate) fn unauthorized(message: &str) -> Self {
        AuthError::Unauthorized(message.to_string())
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AuthError::NotFound("record not found".into()),
            StoreError::Conflict(msg) => AuthError::Conflict(msg),
            other => AuthError::Store(other),
        }
    }
}

impl From<ConfigError> for AuthError {
    fn from(e: ConfigError) -> Self {
        AuthError::Configuration(e.to_string())
    }
}
