use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::intake::DEFAULT_STARTING_POINTS;
use crate::ledger::RetryPolicy;

/// Which versioned store backs the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(config::ConfigError::Message(format!(
                "STORE_BACKEND must be memory or postgres, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bind_address: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub cas_max_attempts: u32,
    pub cas_base_delay_ms: u64,
    pub cas_max_delay_ms: u64,
    pub starting_points: u64,
    pub notify_webhook_url: Option<String>,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            store_backend: env_or("STORE_BACKEND", StoreBackend::Memory)?,
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
            cas_max_attempts: env_or("CAS_MAX_ATTEMPTS", 5)?,
            cas_base_delay_ms: env_or("CAS_BASE_DELAY_MS", 25)?,
            cas_max_delay_ms: env_or("CAS_MAX_DELAY_MS", 1000)?,
            starting_points: env_or("STARTING_POINTS", DEFAULT_STARTING_POINTS)?,
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
        };

        if config.store_backend == StoreBackend::Postgres && config.database_url.is_none() {
            return Err(config::ConfigError::Message(
                "DATABASE_URL must be set when STORE_BACKEND=postgres".to_string(),
            ));
        }
        if config.cas_max_attempts == 0 {
            return Err(config::ConfigError::Message(
                "CAS_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if config.request_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "REQUEST_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.cas_max_attempts,
            base_delay: Duration::from_millis(self.cas_base_delay_ms),
            max_delay: Duration::from_millis(self.cas_max_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, config::ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| config::ConfigError::Message(format!("{}: {}", key, e))),
        _ => Ok(default),
    }
}
