//! Unified error handling for the rota crate
//!
//! Domain errors (fetching, extraction, pool submission) keep their own types
//! in [`crate::utils::error`]; this module wraps them into one [`Error`] that
//! crosses module boundaries, plus the orchestration-level failures.
//!
//! # Architecture
//!
//! - [`RotaErrorTrait`] - Common interface implemented by the error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum
//!
//! Two orchestration failures deserve a note. [`Error::Critical`] aborts a
//! run and carries the validation collected up to that point.
//! [`Error::Degraded`] is what a non-critical phase returns; the orchestrator
//! records it as warnings and carries on.

use crate::crawler::{BatchFetchOutcome, PartitionFailure};
use crate::validation::{Phase, ValidationResult};
use std::io;
use thiserror::Error;

pub use crate::utils::error::{ExtractError, FetchError, FetchFailureKind, PoolError};

/// Common trait for rota error types
pub trait RotaErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, server errors)
    Network,
    /// Parsing and data extraction errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Phase sequencing and concurrency errors
    Orchestration,
    /// Work stopped on request
    Cancelled,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Orchestration => "orchestration",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }
}

impl RotaErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        self.is_transient()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse { .. } => ErrorCategory::Parsing,
            Self::InvalidUrl(_) => ErrorCategory::Config,
            Self::Cancelled => ErrorCategory::Cancelled,
            _ => ErrorCategory::Network,
        }
    }
}

impl RotaErrorTrait for PoolError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Orchestration
    }
}

/// Unified error type for the rota crate
#[derive(Error, Debug)]
pub enum Error {
    /// Failure that aborts an orchestration run
    #[error("critical failure in {phase}: {reason}")]
    Critical {
        phase: Phase,
        reason: String,
        validation: Box<ValidationResult>,
    },

    /// Non-critical phase failure; recorded as a warning by the orchestrator
    #[error("{phase} degraded: {reason}")]
    Degraded { phase: Phase, reason: String },

    /// Single-fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// HTML extraction errors
    #[error("Extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Worker pool submission errors
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// No partition produced records
    #[error("all {} partitions failed", failures.len())]
    TotalFetchFailure { failures: Vec<PartitionFailure> },

    /// Some partitions succeeded, but fewer than the success policy requires
    #[error("only {succeeded} of {total} partitions succeeded (need {required_ratio:.2})")]
    InsufficientSuccess {
        succeeded: usize,
        total: usize,
        required_ratio: f64,
        outcome: Box<BatchFetchOutcome>,
    },

    /// Work stopped on request before anything usable was produced
    #[error("operation cancelled")]
    Cancelled,

    /// `execute` called while another run is in flight
    #[error("an orchestration is already running")]
    AlreadyRunning,

    /// Caller-supplied arguments are unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Spreadsheet content could not be read at all
    #[error("Import error: {0}")]
    Import(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RotaErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Pool(e) => e.is_recoverable(),
            Self::TotalFetchFailure { .. } | Self::InsufficientSuccess { .. } => true,
            Self::Degraded { .. } | Self::AlreadyRunning => true,
            Self::Io(_) => true,
            Self::Critical { .. }
            | Self::Extract(_)
            | Self::Cancelled
            | Self::InvalidInput(_)
            | Self::Import(_)
            | Self::Database(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::TotalFetchFailure { .. } | Self::InsufficientSuccess { .. } => {
                ErrorCategory::Network
            }
            Self::Extract(_) | Self::Import(_) | Self::Json(_) => ErrorCategory::Parsing,
            Self::Critical { .. } | Self::Degraded { .. } | Self::Pool(_) | Self::AlreadyRunning => {
                ErrorCategory::Orchestration
            }
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::InvalidInput(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn degraded(phase: Phase, reason: impl Into<String>) -> Self {
        Self::Degraded {
            phase,
            reason: reason.into(),
        }
    }

    /// Validation attached to a critical failure
    pub fn validation(&self) -> Option<&ValidationResult> {
        match self {
            Self::Critical { validation, .. } => Some(&**validation),
            _ => None,
        }
    }
}

// Conversion from rusqlite::Error
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
