//! rota - Staff schedule import orchestration
//!
//! Imports a schedule spreadsheet, enriches it with shifts scraped from an
//! external scheduling site and resolves staffing coverage for the period.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Rate-limited, bounded, retrying month-by-month scraping
//! - [`parser`] - HTML extraction of schedule rows
//! - [`coverage`] - Batch-loaded coverage resolution and metrics
//! - [`import`] - Spreadsheet (phase 1) and external (phase 2) importers
//! - [`orchestrator`] - Phase sequencing with critical/degraded failure handling
//! - [`validation`] - Phase-tagged validation messages
//! - [`models`] - Core data structures and types
//! - [`storage`] - Persistence (SQLite, in-memory)
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use rota::config::Config;
//! use rota::crawler::ScheduleScraper;
//! use rota::models::Partition;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let scraper = ScheduleScraper::from_config(&config)?;
//!     let start = Partition::new(2025, 1).expect("valid month");
//!     let outcome = scraper
//!         .scrape_schedule(start, 3, &CancellationToken::new())
//!         .await?;
//!     println!("{} records", outcome.records.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coverage;
pub mod crawler;
pub mod error;
pub mod import;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod storage;
pub mod utils;
pub mod validation;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::coverage::{CoverageRequirements, CoverageResolver};
    pub use crate::crawler::{BatchFetchOutcome, ScheduleScraper};
    pub use crate::error::{Error, ErrorCategory, Result, RotaErrorTrait};
    pub use crate::models::{AssignmentRecord, CoverageDecision, Partition, ScheduleArtifact};
    pub use crate::orchestrator::{ImportOrchestrator, OrchestrationResult, OrchestrationStatus};
    pub use crate::validation::{Phase, ValidationResult};
}

// Direct re-exports for convenience
pub use models::{Partition, ShiftType, Specialty};
