//! Service configuration.
//!
//! Loads from environment variables (via .env file) with sensible
//! defaults, then validates ranges before anything starts.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub quotes: QuoteConfig,
    pub logging: LoggingConfig,
}

/// Where the game record, history and price cache live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Quote source endpoint and resilience knobs.
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// Base URL of the chart-style market-data API.
    pub base_url: String,
    /// HTTP request timeout (seconds).
    pub http_timeout_secs: u64,
    /// Cache entry time-to-live (seconds). Default 6 hours.
    pub cache_ttl_secs: u64,
    /// Total fetch attempts when rate-limited.
    pub retry_max_attempts: u32,
    /// First backoff delay (seconds), doubled per attempt.
    pub retry_initial_backoff_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (ignoring error if not found)
        let _ = dotenv::dotenv();

        Ok(Config {
            storage: StorageConfig {
                data_dir: PathBuf::from(get_env_string("DATA_DIR", "./data")?),
            },
            quotes: QuoteConfig {
                base_url: get_env_string("QUOTE_BASE_URL", "https://query1.finance.yahoo.com")?,
                http_timeout_secs: get_env_u64("QUOTE_HTTP_TIMEOUT_SECS", 10)?,
                cache_ttl_secs: get_env_u64("CACHE_TTL_SECS", 21600)?,
                retry_max_attempts: get_env_u32("RETRY_MAX_ATTEMPTS", 5)?,
                retry_initial_backoff_secs: get_env_u64("RETRY_INITIAL_BACKOFF_SECS", 10)?,
            },
            logging: LoggingConfig {
                log_level: get_env_string("LOG_LEVEL", "info")?,
            },
        })
    }

    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        if self.quotes.base_url.is_empty() {
            anyhow::bail!("QUOTE_BASE_URL must be set");
        }
        if self.quotes.http_timeout_secs == 0 {
            anyhow::bail!("QUOTE_HTTP_TIMEOUT_SECS must be > 0");
        }
        if self.quotes.cache_ttl_secs == 0 {
            anyhow::bail!("CACHE_TTL_SECS must be > 0");
        }
        if self.quotes.retry_max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be > 0");
        }
        if self.quotes.retry_initial_backoff_secs == 0 {
            anyhow::bail!("RETRY_INITIAL_BACKOFF_SECS must be > 0");
        }
        Ok(())
    }
}

// Helper functions for environment variable parsing

fn get_env_string(key: &str, default: &str) -> Result<String> {
    Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn get_env_u32(key: &str, default: u32) -> Result<u32> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("Invalid {} value", key))
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("Invalid {} value", key))
}
