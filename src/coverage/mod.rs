//! Coverage resolution
//!
//! Loads every assignment of a period with one store query, then decides for
//! each record which shift type it effectively covers. A reassignment rule
//! fires when the period has nobody able to read the rule's specialty; that
//! fact is computed once, in a single scan of the loaded batch, so resolving
//! stays linear with exactly one I/O round trip.

pub mod algorithm;

pub use algorithm::{calculate_metrics, CoverageDetail, CoverageMetrics, CoverageStatus};

use crate::error::Result;
use crate::models::{AssignmentRecord, CoverageDecision, ScheduleArtifact, ShiftType, Specialty};
use crate::storage::SharedScheduleStore;
use crate::validation::{codes, context, ValidationResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// Requirements
// ============================================================================

/// Unique people a shift type needs across the period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftRequirement {
    pub shift_type: ShiftType,
    pub required: u32,
}

/// Move `applies_to` shifts to `reassign_to` when nobody in the period can
/// read `required_specialty`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignmentRule {
    pub applies_to: ShiftType,
    pub required_specialty: Specialty,
    pub reassign_to: ShiftType,
}

impl ReassignmentRule {
    pub fn describe(&self) -> String {
        format!(
            "no {} reader in period; {} covered as {}",
            self.required_specialty, self.applies_to, self.reassign_to
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageRequirements {
    #[serde(default)]
    pub shifts: Vec<ShiftRequirement>,
    #[serde(default)]
    pub reassignment_rules: Vec<ReassignmentRule>,
}

impl CoverageRequirements {
    /// One requirement per known shift type plus the neuro fallback rule
    pub fn standard() -> Self {
        Self {
            shifts: ShiftType::all()
                .into_iter()
                .map(|shift_type| ShiftRequirement {
                    shift_type,
                    required: 1,
                })
                .collect(),
            reassignment_rules: vec![ReassignmentRule {
                applies_to: ShiftType::MidLate,
                required_specialty: Specialty::Neuro,
                reassign_to: ShiftType::Overnight1,
            }],
        }
    }
}

// ============================================================================
// Pure resolution
// ============================================================================

/// Period-wide facts gathered in one pass over the batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodContext {
    specialties: HashSet<Specialty>,
}

impl PeriodContext {
    pub fn scan(records: &[AssignmentRecord]) -> Self {
        Self {
            specialties: records.iter().map(|r| r.specialty).collect(),
        }
    }

    /// Someone in the period can read `required`
    pub fn has_reader(&self, required: Specialty) -> bool {
        self.specialties.iter().any(|s| s.covers(required))
    }
}

/// Classify every record. Pure; one decision per input record, in order.
pub fn resolve(
    records: &[AssignmentRecord],
    requirements: &CoverageRequirements,
) -> Vec<CoverageDecision> {
    let period = PeriodContext::scan(records);
    let active: Vec<&ReassignmentRule> = requirements
        .reassignment_rules
        .iter()
        .filter(|rule| !period.has_reader(rule.required_specialty))
        .collect();

    records
        .iter()
        .map(|record| {
            let rule = active.iter().find(|r| r.applies_to == record.shift_type);
            CoverageDecision {
                period_id: record.period_id,
                date: record.date,
                person: record.person.clone(),
                original_type: record.shift_type,
                effective_type: rule.map_or(record.shift_type, |r| r.reassign_to),
                reason: rule.map(|r| r.describe()),
            }
        })
        .collect()
}

// ============================================================================
// Resolver
// ============================================================================

/// Everything phase 3 produced for one period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub period_id: Uuid,
    pub decisions: Vec<CoverageDecision>,
    pub metrics: CoverageMetrics,
    pub validation: ValidationResult,
}

impl CoverageReport {
    pub fn reassigned_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.is_reassigned()).count()
    }
}

/// Coverage stage of an import
#[async_trait]
pub trait CoverageService: Send + Sync {
    async fn resolve_coverage(
        &self,
        artifact: &ScheduleArtifact,
        token: &CancellationToken,
    ) -> Result<CoverageReport>;
}

/// Batch-loading coverage resolver over a [`ScheduleStore`](crate::storage::ScheduleStore)
pub struct CoverageResolver {
    store: SharedScheduleStore,
    requirements: CoverageRequirements,
}

impl CoverageResolver {
    pub fn new(store: SharedScheduleStore, requirements: CoverageRequirements) -> Self {
        Self {
            store,
            requirements,
        }
    }

    pub fn requirements(&self) -> &CoverageRequirements {
        &self.requirements
    }

    /// Every assignment of the period, in one query
    pub async fn load_assignments(&self, period_id: Uuid) -> Result<Vec<AssignmentRecord>> {
        self.store.load_assignments_for_period(period_id).await
    }

    pub fn resolve(&self, records: &[AssignmentRecord]) -> Vec<CoverageDecision> {
        resolve(records, &self.requirements)
    }

    /// Load, resolve, measure and persist the decisions for one period
    pub async fn resolve_period(&self, period_id: Uuid) -> Result<CoverageReport> {
        let records = self.load_assignments(period_id).await?;
        let decisions = self.resolve(&records);
        let metrics = calculate_metrics(&decisions, &self.requirements.shifts);
        let validation = self.validate(&decisions, &metrics);

        let saved = self
            .store
            .save_coverage_decisions(period_id, &decisions)
            .await?;
        debug!(%period_id, saved, "coverage decisions saved");

        let report = CoverageReport {
            period_id,
            decisions,
            metrics,
            validation,
        };
        info!(
            %period_id,
            records = records.len(),
            reassigned = report.reassigned_count(),
            overall = report.metrics.overall_percentage,
            "coverage resolved"
        );
        Ok(report)
    }

    fn validate(&self, decisions: &[CoverageDecision], metrics: &CoverageMetrics) -> ValidationResult {
        let mut result = ValidationResult::new();

        for shift_type in &metrics.under_staffed {
            let Some(detail) = metrics.detail(*shift_type) else {
                continue;
            };
            let ctx = context([
                ("shift_type", serde_json::json!(shift_type.as_str())),
                ("required", serde_json::json!(detail.required)),
                ("assigned", serde_json::json!(detail.assigned)),
            ]);
            if detail.status == CoverageStatus::Uncovered {
                result.add_warning_with_context(
                    codes::COVERAGE_GAP,
                    format!("no one covers {shift_type}"),
                    ctx,
                );
            } else {
                result.add_warning_with_context(
                    codes::UNDERSTAFFED,
                    format!(
                        "{shift_type} has {} of {} required people",
                        detail.assigned, detail.required
                    ),
                    ctx,
                );
            }
        }

        let reassigned = decisions.iter().filter(|d| d.is_reassigned()).count();
        if reassigned > 0 {
            result.add_info_with_context(
                codes::REASSIGNMENT_APPLIED,
                format!("{reassigned} assignments reassigned"),
                context([("count", reassigned)]),
            );
        }

        result.set_context("overall_percentage", metrics.overall_percentage);
        result.set_context("summary", metrics.summary.clone());
        result
    }
}

#[async_trait]
impl CoverageService for CoverageResolver {
    async fn resolve_coverage(
        &self,
        artifact: &ScheduleArtifact,
        token: &CancellationToken,
    ) -> Result<CoverageReport> {
        if token.is_cancelled() {
            return Err(crate::error::Error::Cancelled);
        }
        self.resolve_period(artifact.period_id).await
    }
}
