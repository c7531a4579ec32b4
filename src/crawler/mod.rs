//! Concurrent fetching of the external schedule site
//!
//! This module implements month-partitioned scraping with rate limiting,
//! bounded concurrency, retry with backoff and cross-partition dedup.
//!
//! ```text
//!  scrape_schedule(start, count)
//!        │ one FetchTask per month
//!        ▼
//!   WorkerPool ──► PartitionMachine ──► RateLimiter ──► PageSource ──► ScheduleExtractor
//!        │                                                                  │
//!        └──────────────── reports, merged with SeenKeys ◄──────────────────┘
//! ```

pub mod client;
pub mod outcome;
pub mod pool;
pub mod rate_limit;
pub mod scrape;
pub mod state;

pub use client::{PageSource, ScheduleClient, DEFAULT_TIMEOUT};
pub use outcome::{BatchFetchOutcome, PartitionFailure};
pub use pool::{PoolConfig, SeenKeys, WorkerPool};
pub use rate_limit::RateLimiter;
pub use scrape::{ScheduleScraper, ScraperConfig, SuccessPolicy};
pub use state::{PartitionEvent, PartitionMachine, PartitionState};

use crate::config::Config;
use crate::error::Result;
use crate::parser::TableExtractor;
use std::sync::Arc;

impl ScheduleScraper {
    /// HTTP-backed scraper with the default table extractor
    ///
    /// # Errors
    ///
    /// `Error::Fetch` if the configured base URL is unusable
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ScheduleClient::with_config(
            &config.fetcher.base_url,
            config.request_timeout(),
            config.fetcher.user_agent.clone(),
        )?;
        Ok(Self::new(
            Arc::new(client),
            Arc::new(TableExtractor::new()),
            config.scraper_config(),
        ))
    }
}
