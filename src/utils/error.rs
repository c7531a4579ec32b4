//! Error types for the schedule scraper
//!
//! Fetch, extraction and worker-pool failures. A scrape run never surfaces
//! these individually; they are folded into the batch outcome per partition.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure classification attached to a partition in a batch outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    /// Connection, DNS or timeout failure
    Network,
    /// Non-success HTTP status that was not retried
    HttpStatus,
    /// Page fetched but could not be turned into records
    Parse,
    /// Transient failure that outlived the retry ceiling
    RetryExhausted,
    /// Partition never ran because the worker queue was full
    QueueFull,
    /// Partition was still pending when the run was cancelled
    Cancelled,
}

impl FetchFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::HttpStatus => "http_status",
            Self::Parse => "parse",
            Self::RetryExhausted => "retry_exhausted",
            Self::QueueFull => "queue_full",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a single page fetch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Transport-level failure (connect, DNS, timeout, body read)
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Body could not be decoded or extracted
    #[error("failed to parse {url}: {reason}")]
    Parse { url: String, reason: String },

    /// Transient failures continued past the retry ceiling
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    RetryExhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },

    /// Base URL or joined path is not a valid http(s) URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Cancellation was requested while the fetch was pending
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Build a network error from a reqwest failure
    pub fn network(url: &str, err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self::Network {
            url: url.to_string(),
            reason,
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// Only network failures and 5xx responses qualify. 4xx responses and
    /// parse failures are permanent for the partition.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn kind(&self) -> FetchFailureKind {
        match self {
            Self::Network { .. } | Self::InvalidUrl(_) => FetchFailureKind::Network,
            Self::HttpStatus { .. } => FetchFailureKind::HttpStatus,
            Self::Parse { .. } => FetchFailureKind::Parse,
            Self::RetryExhausted { .. } => FetchFailureKind::RetryExhausted,
            Self::Cancelled => FetchFailureKind::Cancelled,
        }
    }

    /// URL the failure is tied to, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Network { url, .. }
            | Self::HttpStatus { url, .. }
            | Self::Parse { url, .. }
            | Self::RetryExhausted { url, .. } => Some(url),
            Self::InvalidUrl(url) => Some(url),
            Self::Cancelled => None,
        }
    }

    /// Last HTTP status seen, looking through retry exhaustion
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::RetryExhausted { last, .. } => last.status_code(),
            _ => None,
        }
    }
}

/// Errors that can occur while extracting records from a page
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// Page has no schedule table at all
    #[error("schedule table not found")]
    TableNotFound,

    /// A configured CSS selector does not parse
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// Errors returned to callers submitting work to the pool
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Pending queue is at capacity; the job was not accepted
    #[error("worker queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Pool was closed or cancelled
    #[error("worker pool is closed")]
    Closed,
}
