//! Persistence for schedule artifacts, assignments and coverage decisions
//!
//! Business logic talks to [`ScheduleStore`]; [`SqliteStore`] is the durable
//! backend and [`MemoryStore`] backs tests and dry runs.
//!
//! ```text
//!   orchestrator / coverage / importers
//!                  │
//!                  ▼
//!           ScheduleStore
//!          ┌───────┴───────┐
//!          ▼               ▼
//!     SqliteStore     MemoryStore
//! ```
//!
//! Writes are idempotent by overwrite: inserting an assignment that already
//! exists (same period, date, shift type and person) replaces it, and saving
//! coverage decisions replaces every earlier decision for the period.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::models::{AssignmentRecord, CoverageDecision, ScheduleArtifact};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Storage operations used by the import pipeline
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Persist a newly created schedule artifact
    async fn create_artifact(&self, artifact: &ScheduleArtifact) -> Result<()>;

    async fn get_artifact(&self, id: Uuid) -> Result<Option<ScheduleArtifact>>;

    /// Store assignments, replacing identical ones; returns rows written
    async fn insert_assignments(&self, records: &[AssignmentRecord]) -> Result<usize>;

    /// Every assignment of the period, fetched with a single query
    async fn load_assignments_for_period(&self, period_id: Uuid) -> Result<Vec<AssignmentRecord>>;

    /// Replace the period's coverage decisions; returns rows written
    async fn save_coverage_decisions(
        &self,
        period_id: Uuid,
        decisions: &[CoverageDecision],
    ) -> Result<usize>;

    async fn load_coverage_decisions(&self, period_id: Uuid) -> Result<Vec<CoverageDecision>>;
}

/// Shared, thread-safe store handle
pub type SharedScheduleStore = Arc<dyn ScheduleStore>;
