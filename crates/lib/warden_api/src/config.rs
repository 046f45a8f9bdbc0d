//! API server configuration.

use warden_core::AuthConfig;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3100";
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/warden";

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Token, hashing and session settings handed to the engine.
    pub auth: AuthConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable       | Default                             |
    /// |----------------|-------------------------------------|
    /// | `BIND_ADDR`    | `127.0.0.1:3100`                    |
    /// | `DATABASE_URL` | `postgres://localhost:5432/warden`  |
    ///
    /// Auth settings come from [`AuthConfig::from_env`].
    pub fn from_env() -> Result<Self, warden_core::ConfigError> {
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
            auth: AuthConfig::from_env()?,
        })
    }
}
