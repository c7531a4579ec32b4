//! Orchestration status, readable from any thread while a run is in flight

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationStatus {
    /// Never run
    #[default]
    Idle,
    /// `execute` in progress
    Running,
    /// Last run finished; later phases may have degraded
    Completed,
    /// Last run aborted on a critical failure
    Failed,
}

impl OrchestrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Failed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free status holder; one writer, any number of readers
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> OrchestrationStatus {
        OrchestrationStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, status: OrchestrationStatus) {
        self.0.store(status.to_u8(), Ordering::Release);
    }

    /// Move to `Running` unless a run is already in flight.
    /// Returns the status that blocked the transition on failure.
    pub fn try_start(&self) -> Result<(), OrchestrationStatus> {
        let running = OrchestrationStatus::Running.to_u8();
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == running {
                return Err(OrchestrationStatus::Running);
            }
            match self
                .0
                .compare_exchange(current, running, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }
}
