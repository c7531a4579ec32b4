//! Aggregated result of one scrape run

use crate::models::{Partition, RawShift};
use crate::utils::error::FetchFailureKind;
use serde::{Deserialize, Serialize};

/// Why one partition produced no records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFailure {
    pub partition: Partition,
    pub url: String,
    pub kind: FetchFailureKind,
    pub message: String,
    /// Last HTTP status seen, if the server answered at all
    pub status_code: Option<u16>,
    pub attempts: u32,
}

impl std::fmt::Display for PartitionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.kind, self.partition, self.url, self.message
        )
    }
}

/// Deduplicated records and per-partition bookkeeping for one scrape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchFetchOutcome {
    pub records: Vec<RawShift>,
    pub months_requested: usize,
    pub months_processed: usize,
    pub months_failed: usize,
    pub failures: Vec<PartitionFailure>,
    /// Records dropped because their natural key was already merged
    pub duplicate_count: usize,
    pub warnings: Vec<String>,
    /// Run was cut short by cancellation
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl BatchFetchOutcome {
    pub fn new(months_requested: usize) -> Self {
        Self {
            months_requested,
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Records seen before deduplication
    pub fn total_records(&self) -> usize {
        self.records.len() + self.duplicate_count
    }

    /// Fraction of requested partitions that succeeded
    pub fn success_ratio(&self) -> f64 {
        if self.months_requested == 0 {
            0.0
        } else {
            self.months_processed as f64 / self.months_requested as f64
        }
    }

    pub fn failures_of(&self, kind: FetchFailureKind) -> Vec<&PartitionFailure> {
        self.failures.iter().filter(|f| f.kind == kind).collect()
    }

    pub fn formatted_errors(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("  - {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn formatted_warnings(&self) -> String {
        self.warnings
            .iter()
            .map(|w| format!("  - {w}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn record_failure(&mut self, failure: PartitionFailure) {
        self.months_failed += 1;
        self.failures.push(failure);
    }
}
