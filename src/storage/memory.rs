//! In-memory store
//!
//! Counts every period load so callers can check how many round trips a
//! computation needed.

use super::ScheduleStore;
use crate::error::Result;
use crate::models::{AssignmentRecord, CoverageDecision, ScheduleArtifact};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: RwLock<HashMap<Uuid, ScheduleArtifact>>,
    assignments: RwLock<HashMap<Uuid, Vec<AssignmentRecord>>>,
    decisions: RwLock<HashMap<Uuid, Vec<CoverageDecision>>>,
    assignment_queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `load_assignments_for_period` calls so far
    pub fn assignment_queries(&self) -> usize {
        self.assignment_queries.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.assignment_queries.store(0, Ordering::SeqCst);
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn same_assignment(a: &AssignmentRecord, b: &AssignmentRecord) -> bool {
    a.date == b.date && a.shift_type == b.shift_type && a.person == b.person
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn create_artifact(&self, artifact: &ScheduleArtifact) -> Result<()> {
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, id: Uuid) -> Result<Option<ScheduleArtifact>> {
        Ok(self
            .artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn insert_assignments(&self, records: &[AssignmentRecord]) -> Result<usize> {
        let mut assignments = self
            .assignments
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for record in records {
            let period = assignments.entry(record.period_id).or_default();
            match period.iter_mut().find(|r| same_assignment(r, record)) {
                Some(existing) => *existing = record.clone(),
                None => period.push(record.clone()),
            }
        }
        Ok(records.len())
    }

    async fn load_assignments_for_period(&self, period_id: Uuid) -> Result<Vec<AssignmentRecord>> {
        self.assignment_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .assignments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&period_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_coverage_decisions(
        &self,
        period_id: Uuid,
        decisions: &[CoverageDecision],
    ) -> Result<usize> {
        let mut unique: Vec<CoverageDecision> = Vec::with_capacity(decisions.len());
        for decision in decisions {
            let duplicate = unique.iter().any(|d| {
                d.date == decision.date
                    && d.person == decision.person
                    && d.original_type == decision.original_type
            });
            if !duplicate {
                unique.push(decision.clone());
            }
        }
        let written = unique.len();
        self.decisions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(period_id, unique);
        Ok(written)
    }

    async fn load_coverage_decisions(&self, period_id: Uuid) -> Result<Vec<CoverageDecision>> {
        Ok(self
            .decisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&period_id)
            .cloned()
            .unwrap_or_default())
    }
}
