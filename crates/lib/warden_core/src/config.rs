//! Engine configuration.
//!
//! One immutable [`AuthConfig`] is built at startup and handed to the token
//! service and the engine. Nothing below this module reads the environment.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Insecure development fallbacks. Rejected in production.
pub const DEV_ACCESS_SECRET: &str = "warden-dev-access-secret-change-in-production";
pub const DEV_REFRESH_SECRET: &str = "warden-dev-refresh-secret-change-in-production";

pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_ISSUER: &str = "warden-api";
pub const DEFAULT_AUDIENCE: &str = "warden-users";
pub const DEFAULT_BCRYPT_COST: u32 = 12;
/// Cost bounds accepted by bcrypt.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;
pub const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration faults. All are fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    MissingSecret(&'static str),

    #[error("JWT_SECRET and JWT_REFRESH_SECRET must differ")]
    SharedSecret,

    #[error("invalid {key}={value:?}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Deployment mode. Only `Development` tolerates built-in secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Whether refresh consults the session ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    /// Refresh tokens are bearer secrets valid until expiry. Rotation is
    /// non-destructive and logout does not make a token unusable.
    #[default]
    Stateless,
    /// Refresh requires an active ledger entry and consumes it; logout revokes.
    Tracked,
}

/// Failed-login lockout. `max_attempts == 0` disables lockout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lock_duration: DEFAULT_LOCKOUT,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
    pub audience: String,
    pub bcrypt_cost: u32,
    pub lockout: LockoutPolicy,
    pub session_policy: SessionPolicy,
    /// Deadline applied to every store call made by the engine.
    pub store_timeout: Duration,
    pub environment: Environment,
}

// Secrets stay out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("lockout", &self.lockout)
            .field("session_policy", &self.session_policy)
            .field("store_timeout", &self.store_timeout)
            .field("environment", &self.environment)
            .finish()
    }
}

impl AuthConfig {
    /// Development configuration with the built-in secrets.
    pub fn development() -> Self {
        Self {
            access_secret: DEV_ACCESS_SECRET.into(),
            refresh_secret: DEV_REFRESH_SECRET.into(),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            issuer: DEFAULT_ISSUER.into(),
            audience: DEFAULT_AUDIENCE.into(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            lockout: LockoutPolicy::default(),
            session_policy: SessionPolicy::Stateless,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            environment: Environment::Development,
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable                 | Default                                  |
    /// |--------------------------|------------------------------------------|
    /// | `WARDEN_ENV`             | `development`                            |
    /// | `JWT_SECRET`             | dev secret; required in production       |
    /// | `JWT_REFRESH_SECRET`     | dev secret; required in production       |
    /// | `JWT_EXPIRES_IN`         | `15m`                                    |
    /// | `JWT_REFRESH_EXPIRES_IN` | `7d`                                     |
    /// | `JWT_ISSUER`             | `warden-api`                             |
    /// | `JWT_AUDIENCE`           | `warden-users`                           |
    /// | `BCRYPT_COST`            | `12`                                     |
    /// | `LOGIN_MAX_ATTEMPTS`     | `5` (`0` disables lockout)               |
    /// | `LOGIN_LOCKOUT`          | `15m`                                    |
    /// | `SESSION_POLICY`         | `stateless` (or `tracked`)               |
    /// | `STORE_TIMEOUT`          | `10s`                                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AuthConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match get("WARDEN_ENV").as_deref().map(str::trim) {
            None | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => return Err(invalid("WARDEN_ENV", other, "expected development or production")),
        };

        let access_secret = secret(get("JWT_SECRET"), "JWT_SECRET", DEV_ACCESS_SECRET, environment)?;
        let refresh_secret = secret(
            get("JWT_REFRESH_SECRET"),
            "JWT_REFRESH_SECRET",
            DEV_REFRESH_SECRET,
            environment,
        )?;

        let session_policy = match get("SESSION_POLICY").as_deref().map(str::trim) {
            None | Some("stateless") => SessionPolicy::Stateless,
            Some("tracked") => SessionPolicy::Tracked,
            Some(other) => return Err(invalid("SESSION_POLICY", other, "expected stateless or tracked")),
        };

        let bcrypt_cost = match get("BCRYPT_COST") {
            None => DEFAULT_BCRYPT_COST,
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| invalid("BCRYPT_COST", &raw, &format!("{e}")))?,
        };

        let max_attempts = match get("LOGIN_MAX_ATTEMPTS") {
            None => DEFAULT_MAX_LOGIN_ATTEMPTS,
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| invalid("LOGIN_MAX_ATTEMPTS", &raw, &format!("{e}")))?,
        };

        let config = Self {
            access_secret,
            refresh_secret,
            access_ttl: duration(get("JWT_EXPIRES_IN"), "JWT_EXPIRES_IN", DEFAULT_ACCESS_TTL)?,
            refresh_ttl: duration(
                get("JWT_REFRESH_EXPIRES_IN"),
                "JWT_REFRESH_EXPIRES_IN",
                DEFAULT_REFRESH_TTL,
            )?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_AUDIENCE.into()),
            bcrypt_cost,
            lockout: LockoutPolicy {
                max_attempts,
                lock_duration: duration(get("LOGIN_LOCKOUT"), "LOGIN_LOCKOUT", DEFAULT_LOCKOUT)?,
            },
            session_policy,
            store_timeout: duration(get("STORE_TIMEOUT"), "STORE_TIMEOUT", DEFAULT_STORE_TIMEOUT)?,
            environment,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants. Called by the engine constructor too,
    /// so hand-built configs get the same treatment as env-sourced ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.is_empty() {
            return Err(ConfigError::MissingSecret("JWT_SECRET"));
        }
        if self.refresh_secret.is_empty() {
            return Err(ConfigError::MissingSecret("JWT_REFRESH_SECRET"));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::SharedSecret);
        }
        if self.environment == Environment::Production {
            if self.access_secret == DEV_ACCESS_SECRET {
                return Err(ConfigError::MissingSecret("JWT_SECRET"));
            }
            if self.refresh_secret == DEV_REFRESH_SECRET {
                return Err(ConfigError::MissingSecret("JWT_REFRESH_SECRET"));
            }
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.bcrypt_cost) {
            return Err(invalid(
                "BCRYPT_COST",
                &self.bcrypt_cost.to_string(),
                &format!("must be within {}..={}", MIN_BCRYPT_COST, MAX_BCRYPT_COST),
            ));
        }
        if self.access_ttl.is_zero() {
            return Err(invalid("JWT_EXPIRES_IN", "0s", "must be positive"));
        }
        if self.refresh_ttl.is_zero() {
            return Err(invalid("JWT_REFRESH_EXPIRES_IN", "0s", "must be positive"));
        }
        if self.store_timeout.is_zero() {
            return Err(invalid("STORE_TIMEOUT", "0s", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn secret(
    value: Option<String>,
    key: &'static str,
    fallback: &str,
    environment: Environment,
) -> Result<String, ConfigError> {
    match (value, environment) {
        (Some(v), _) => Ok(v),
        (None, Environment::Production) => Err(ConfigError::MissingSecret(key)),
        (None, Environment::Development) => {
            warn!(key, "using insecure development secret; set it before deploying");
            Ok(fallback.to_string())
        }
    }
}

fn duration(value: Option<String>, key: &'static str, fallback: Duration) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(fallback),
        Some(raw) => {
            humantime::parse_duration(raw.trim()).map_err(|e| invalid(key, &raw, &e.to_string()))
        }
    }
}
