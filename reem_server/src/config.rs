//! Server configuration.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration. The stake ladder and pool size are build-time constants
//! in the core crate.

use reem::db::DatabaseConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Complete server configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Server bind address.
    pub bind: SocketAddr,
    /// Prometheus exporter bind address.
    pub metrics_bind: SocketAddr,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// HS256 secret shared with the external auth service (required).
    pub token_secret: String,
    /// Allowed CORS origins; `*` means permissive.
    pub allowed_origins: Vec<String>,
    /// Server-to-client ping cadence.
    pub ping_interval: Duration,
    /// Idle connections are dropped after this long.
    pub idle_timeout: Duration,
    /// Background sweep cadence (queue expiry).
    pub cleanup_interval: Duration,
    /// Periodic matchmaker cadence.
    pub matchmaker_interval: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when required variables are missing or invalid.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:7070"
                    .parse()
                    .expect("default bind address is valid")
            });

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| {
                "127.0.0.1:9090"
                    .parse()
                    .expect("default metrics address is valid")
            });

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let token_secret =
            std::env::var("TOKEN_SECRET").map_err(|_| ConfigError::MissingRequired {
                var: "TOKEN_SECRET".to_string(),
                hint: "Generate with: openssl rand -hex 32".to_string(),
            })?;

        let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(ServerConfig {
            bind,
            metrics_bind,
            database,
            token_secret,
            allowed_origins,
            ping_interval: Duration::from_secs(parse_env_or("PING_INTERVAL_SECS", 30)),
            idle_timeout: Duration::from_secs(parse_env_or("IDLE_TIMEOUT_SECS", 300)),
            cleanup_interval: Duration::from_secs(parse_env_or("CLEANUP_INTERVAL_SECS", 60)),
            matchmaker_interval: Duration::from_secs(parse_env_or("MATCHMAKER_INTERVAL_SECS", 10)),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "TOKEN_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }
        if self.ping_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "PING_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }
        if self.matchmaker_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "MATCHMAKER_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }
        if self.idle_timeout < self.ping_interval {
            return Err(ConfigError::Invalid {
                var: "IDLE_TIMEOUT_SECS".to_string(),
                reason: "Must be at least the ping interval".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
