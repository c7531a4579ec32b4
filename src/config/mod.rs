//! Configuration management for rota
//!
//! Settings come from `ROTA_*` environment variables or a TOML file; every
//! section has defaults, so a file only needs the keys it overrides.

use crate::coverage::CoverageRequirements;
use crate::crawler::{PoolConfig, ScraperConfig, SuccessPolicy};
use crate::utils::retry::RetryConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External site fetching
    pub fetcher: FetcherConfig,

    /// Staffing requirements and reassignment rules
    pub coverage: CoverageRequirements,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Fetcher-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Scheduling site root, e.g. `https://schedule.example.org`
    pub base_url: String,

    /// Month page path; `{month}` becomes `YYYY-MM`
    pub path_template: String,

    /// Concurrent fetch workers
    pub workers: usize,

    /// Pending jobs before submissions are rejected
    pub queue_capacity: usize,

    /// Minimum spacing between requests in milliseconds
    pub rate_interval_ms: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,

    /// Fraction of months that must succeed (0.0 = at least one)
    pub min_success_ratio: f64,

    /// Drop rows dated outside the month they were fetched for
    pub restrict_to_partition: bool,

    /// Fixed user agent; rotates through browser agents when unset
    pub user_agent: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:8080"),
            path_template: String::from("/schedule/{month}"),
            workers: 5,
            queue_capacity: 100,
            rate_interval_ms: 1000,
            request_timeout_secs: 30,
            max_retries: 3,
            base_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            min_success_ratio: 0.0,
            restrict_to_partition: false,
            user_agent: None,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/rota.db"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            coverage: CoverageRequirements::standard(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let d = FetcherConfig::default();
        let fetcher = FetcherConfig {
            base_url: env_or("ROTA_BASE_URL", d.base_url),
            path_template: env_or("ROTA_PATH_TEMPLATE", d.path_template),
            workers: env_or("ROTA_WORKERS", d.workers),
            queue_capacity: env_or("ROTA_QUEUE_CAPACITY", d.queue_capacity),
            rate_interval_ms: env_or("ROTA_RATE_INTERVAL_MS", d.rate_interval_ms),
            request_timeout_secs: env_or("ROTA_REQUEST_TIMEOUT", d.request_timeout_secs),
            max_retries: env_or("ROTA_MAX_RETRIES", d.max_retries),
            base_backoff_ms: env_or("ROTA_BASE_BACKOFF_MS", d.base_backoff_ms),
            max_backoff_ms: env_or("ROTA_MAX_BACKOFF_MS", d.max_backoff_ms),
            min_success_ratio: env_or("ROTA_MIN_SUCCESS_RATIO", d.min_success_ratio),
            restrict_to_partition: env_or("ROTA_RESTRICT_TO_PARTITION", d.restrict_to_partition),
            user_agent: std::env::var("ROTA_USER_AGENT").ok(),
        };

        let database = DatabaseConfig {
            sqlite_path: std::env::var("ROTA_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| DatabaseConfig::default().sqlite_path),
        };

        let logging = LoggingConfig {
            level: std::env::var("ROTA_LOG_LEVEL").unwrap_or_else(|_| String::from("info")),
            format: std::env::var("ROTA_LOG_FORMAT").unwrap_or_else(|_| String::from("text")),
        };

        Ok(Self {
            fetcher,
            coverage: CoverageRequirements::standard(),
            database,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let fetcher = &self.fetcher;

        if fetcher.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }

        if fetcher.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if !(0.0..=1.0).contains(&fetcher.min_success_ratio) {
            anyhow::bail!("min_success_ratio must be between 0.0 and 1.0");
        }

        if fetcher.base_backoff_ms > fetcher.max_backoff_ms {
            anyhow::bail!("base_backoff_ms must not exceed max_backoff_ms");
        }

        if !fetcher.path_template.contains("{month}") {
            anyhow::bail!("path_template must contain {{month}}");
        }

        url::Url::parse(&fetcher.base_url)
            .with_context(|| format!("invalid base_url: {}", fetcher.base_url))?;

        if let Some(bad) = self.coverage.shifts.iter().find(|s| s.required == 0) {
            anyhow::bail!("required staffing for {} must be greater than 0", bad.shift_type);
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetcher.request_timeout_secs)
    }

    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.fetcher.max_retries,
            self.fetcher.base_backoff_ms,
            self.fetcher.max_backoff_ms,
        )
    }

    /// Scraper settings derived from the fetcher section
    #[must_use]
    pub fn scraper_config(&self) -> ScraperConfig {
        ScraperConfig {
            path_template: self.fetcher.path_template.clone(),
            pool: PoolConfig {
                workers: self.fetcher.workers,
                queue_capacity: self.fetcher.queue_capacity,
            },
            rate_interval: Duration::from_millis(self.fetcher.rate_interval_ms),
            retry: self.retry_config(),
            success_policy: SuccessPolicy {
                min_success_ratio: self.fetcher.min_success_ratio,
            },
            restrict_to_partition: self.fetcher.restrict_to_partition,
            ..ScraperConfig::default()
        }
    }
}
