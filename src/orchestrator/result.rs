//! What one orchestration run hands back

use super::status::OrchestrationStatus;
use crate::coverage::CoverageMetrics;
use crate::models::{CoverageDecision, ScheduleArtifact};
use crate::validation::{Phase, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Succeeded,
    Degraded,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Timing and status of one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub duration_ms: u64,
}

/// Merged output of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Phase-1 artifact; present on every completed run
    pub artifact: Option<ScheduleArtifact>,
    /// Empty when phase 3 degraded
    pub decisions: Vec<CoverageDecision>,
    pub coverage: Option<CoverageMetrics>,
    pub phases: Vec<PhaseReport>,
    pub validation: ValidationResult,
    pub status: OrchestrationStatus,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl OrchestrationResult {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// Any later phase ended degraded
    pub fn is_degraded(&self) -> bool {
        self.phases.iter().any(|p| p.status == PhaseStatus::Degraded)
    }

    pub fn reassigned_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.is_reassigned()).count()
    }
}
