//! Coverage metrics
//!
//! Pure computation over resolved decisions: unique people per effective
//! shift type against the configured requirement. No I/O.

use super::ShiftRequirement;
use crate::models::{CoverageDecision, ShiftType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoverageStatus {
    Full,
    Partial,
    Uncovered,
}

impl CoverageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Partial => "PARTIAL",
            Self::Uncovered => "UNCOVERED",
        }
    }
}

/// Staffing of one shift type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageDetail {
    pub shift_type: ShiftType,
    pub required: u32,
    /// Unique people assigned
    pub assigned: u32,
    /// 0-100, capped, two decimals
    pub percentage: f64,
    pub status: CoverageStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageMetrics {
    pub by_shift_type: BTreeMap<ShiftType, CoverageDetail>,
    pub overall_percentage: f64,
    pub under_staffed: Vec<ShiftType>,
    pub over_staffed: Vec<ShiftType>,
    pub summary: String,
}

impl CoverageMetrics {
    pub fn detail(&self, shift_type: ShiftType) -> Option<&CoverageDetail> {
        self.by_shift_type.get(&shift_type)
    }

    pub fn is_fully_covered(&self) -> bool {
        self.under_staffed.is_empty()
    }
}

/// `assigned / required` as a percentage, capped at 100 and rounded to 2 decimals
pub fn coverage_percentage(assigned: u32, required: u32) -> f64 {
    if required == 0 {
        return 0.0;
    }
    let pct = (f64::from(assigned) / f64::from(required) * 100.0).min(100.0);
    (pct * 100.0).round() / 100.0
}

fn status_for(assigned: u32, required: u32) -> CoverageStatus {
    if assigned >= required {
        CoverageStatus::Full
    } else if assigned > 0 {
        CoverageStatus::Partial
    } else {
        CoverageStatus::Uncovered
    }
}

/// Compute coverage metrics over the effective classification of `decisions`
pub fn calculate_metrics(
    decisions: &[CoverageDecision],
    requirements: &[ShiftRequirement],
) -> CoverageMetrics {
    let mut metrics = CoverageMetrics::default();
    if requirements.is_empty() {
        metrics.summary = "No shifts defined".to_string();
        return metrics;
    }

    let mut people: BTreeMap<ShiftType, HashSet<&str>> = requirements
        .iter()
        .map(|r| (r.shift_type, HashSet::new()))
        .collect();
    for decision in decisions {
        if let Some(set) = people.get_mut(&decision.effective_type) {
            set.insert(decision.person.as_str());
        }
    }

    let mut total_assigned = 0u32;
    let mut total_required = 0u32;
    for requirement in requirements {
        let assigned = people
            .get(&requirement.shift_type)
            .map(|s| s.len() as u32)
            .unwrap_or(0);
        let required = requirement.required;
        let detail = CoverageDetail {
            shift_type: requirement.shift_type,
            required,
            assigned,
            percentage: coverage_percentage(assigned, required),
            status: status_for(assigned, required),
        };

        if assigned < required {
            metrics.under_staffed.push(requirement.shift_type);
        } else if assigned > required {
            metrics.over_staffed.push(requirement.shift_type);
        }
        total_assigned += assigned;
        total_required += required;
        metrics.by_shift_type.insert(requirement.shift_type, detail);
    }

    metrics.overall_percentage = coverage_percentage(total_assigned, total_required);
    metrics.summary = summarize(&metrics);
    metrics
}

fn summarize(metrics: &CoverageMetrics) -> String {
    let count = |status: CoverageStatus| {
        metrics
            .by_shift_type
            .values()
            .filter(|d| d.status == status)
            .count()
    };
    let (full, partial, uncovered) = (
        count(CoverageStatus::Full),
        count(CoverageStatus::Partial),
        count(CoverageStatus::Uncovered),
    );

    if metrics.under_staffed.is_empty() {
        format!(
            "Full coverage: {full} shift types fully staffed ({:.1}% overall)",
            metrics.overall_percentage
        )
    } else {
        format!(
            "Coverage: {full} full, {partial} partial, {uncovered} uncovered ({:.1}% overall)",
            metrics.overall_percentage
        )
    }
}
