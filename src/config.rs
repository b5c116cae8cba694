// Service configuration.
//
// Loaded from environment variables (after `.env`) with fallback to defaults.
// Only `JWT_SECRET` is mandatory.

use crate::logging::LogFormat;
use std::env;
use thiserror::Error;

/// Longest accepted token lifetime: one year.
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

/// Which storage engine backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port
    pub server_port: u16,

    /// SQLite database file, or `:memory:`
    pub database_path: String,

    pub storage_backend: StorageBackend,

    /// Secret used to sign bearer tokens
    pub jwt_secret: String,

    /// Bearer token lifetime in hours
    pub token_ttl_hours: i64,

    /// Balance credited to newly registered users
    pub starting_coins: i64,

    pub allow_self_transfer: bool,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    pub log_format: LogFormat,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value_or = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        let server_port = value_or("SERVER_PORT", "8080")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?;

        let database_path = value_or("DATABASE_PATH", "data/shop.db");
        if database_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_PATH".to_string()));
        }

        let storage_backend = match value_or("STORAGE_BACKEND", "sqlite")
            .to_lowercase()
            .as_str()
        {
            "sqlite" => StorageBackend::Sqlite,
            "memory" => StorageBackend::Memory,
            _ => return Err(ConfigError::InvalidValue("STORAGE_BACKEND".to_string())),
        };

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ConfigError::Missing("JWT_SECRET".to_string()))?;

        let token_ttl_hours = value_or("TOKEN_TTL_HOURS", "24")
            .parse::<i64>()
            .ok()
            .filter(|hours| (1..=MAX_TOKEN_TTL_HOURS).contains(hours))
            .ok_or_else(|| ConfigError::InvalidValue("TOKEN_TTL_HOURS".to_string()))?;

        let starting_coins = value_or("STARTING_COINS", "1000")
            .parse::<i64>()
            .ok()
            .filter(|coins| *coins >= 0)
            .ok_or_else(|| ConfigError::InvalidValue("STARTING_COINS".to_string()))?;

        let allow_self_transfer = value_or("ALLOW_SELF_TRANSFER", "false")
            .parse::<bool>()
            .map_err(|_| ConfigError::InvalidValue("ALLOW_SELF_TRANSFER".to_string()))?;

        let log_level = value_or("LOG_LEVEL", "info");

        let log_format = match value_or("LOG_FORMAT", "pretty").to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => return Err(ConfigError::InvalidValue("LOG_FORMAT".to_string())),
        };

        Ok(AppConfig {
            server_port,
            database_path,
            storage_backend,
            jwt_secret,
            token_ttl_hours,
            starting_coins,
            allow_self_transfer,
            log_level,
            log_format,
        })
    }
}
