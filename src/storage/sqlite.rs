//! SQLite-backed schedule store

use super::ScheduleStore;
use crate::error::Result;
use crate::models::{
    AssignmentRecord, CoverageDecision, Partition, RecordSource, ScheduleArtifact, ShiftType,
    Specialty,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Schedule store on a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
    assignment_queries: AtomicUsize,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::from_connection(conn)?;
        tracing::info!(path = %path.display(), "SQLite schedule store initialized");
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            assignment_queries: AtomicUsize::new(0),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schedule_artifacts (
                id TEXT PRIMARY KEY,
                hospital_id TEXT NOT NULL,
                created_by TEXT NOT NULL,
                period_id TEXT NOT NULL,
                start_month TEXT NOT NULL,
                month_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assignments (
                period_id TEXT NOT NULL,
                date TEXT NOT NULL,
                shift_type TEXT NOT NULL,
                person TEXT NOT NULL,
                specialty TEXT NOT NULL,
                source TEXT NOT NULL,
                PRIMARY KEY (period_id, date, shift_type, person)
            );

            CREATE INDEX IF NOT EXISTS idx_assignments_period ON assignments(period_id);

            CREATE TABLE IF NOT EXISTS coverage_decisions (
                period_id TEXT NOT NULL,
                date TEXT NOT NULL,
                person TEXT NOT NULL,
                original_type TEXT NOT NULL,
                effective_type TEXT NOT NULL,
                reason TEXT,
                PRIMARY KEY (period_id, date, person, original_type)
            );
            "#,
        )?;
        Ok(())
    }

    /// Number of period loads issued so far
    pub fn assignment_queries(&self) -> usize {
        self.assignment_queries.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

fn uuid_at(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(index)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(index, e.to_string()))
}

fn date_at(row: &Row<'_>, index: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(index)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(index, e.to_string()))
}

fn shift_at(row: &Row<'_>, index: usize) -> rusqlite::Result<ShiftType> {
    let raw: String = row.get(index)?;
    ShiftType::parse(&raw).ok_or_else(|| conversion_error(index, format!("unknown shift type {raw}")))
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleArtifact> {
    let start: String = row.get(4)?;
    let created: String = row.get(6)?;
    Ok(ScheduleArtifact {
        id: uuid_at(row, 0)?,
        hospital_id: uuid_at(row, 1)?,
        created_by: uuid_at(row, 2)?,
        period_id: uuid_at(row, 3)?,
        start_month: Partition::parse(&start)
            .ok_or_else(|| conversion_error(4, format!("bad month {start}")))?,
        month_count: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(6, e.to_string()))?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<AssignmentRecord> {
    let specialty: String = row.get(4)?;
    let source: String = row.get(5)?;
    Ok(AssignmentRecord {
        period_id: uuid_at(row, 0)?,
        date: date_at(row, 1)?,
        shift_type: shift_at(row, 2)?,
        person: row.get(3)?,
        specialty: Specialty::parse(&specialty)
            .ok_or_else(|| conversion_error(4, format!("unknown specialty {specialty}")))?,
        source: RecordSource::parse(&source)
            .ok_or_else(|| conversion_error(5, format!("unknown source {source}")))?,
    })
}

fn decision_from_row(row: &Row<'_>) -> rusqlite::Result<CoverageDecision> {
    Ok(CoverageDecision {
        period_id: uuid_at(row, 0)?,
        date: date_at(row, 1)?,
        person: row.get(2)?,
        original_type: shift_at(row, 3)?,
        effective_type: shift_at(row, 4)?,
        reason: row.get(5)?,
    })
}

// ============================================================================
// Store implementation
// ============================================================================

#[async_trait]
impl ScheduleStore for SqliteStore {
    async fn create_artifact(&self, artifact: &ScheduleArtifact) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO schedule_artifacts
             (id, hospital_id, created_by, period_id, start_month, month_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                artifact.id.to_string(),
                artifact.hospital_id.to_string(),
                artifact.created_by.to_string(),
                artifact.period_id.to_string(),
                artifact.start_month.key(),
                artifact.month_count,
                artifact.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_artifact(&self, id: Uuid) -> Result<Option<ScheduleArtifact>> {
        let artifact = self
            .conn()
            .query_row(
                "SELECT id, hospital_id, created_by, period_id, start_month, month_count, created_at
                 FROM schedule_artifacts WHERE id = ?1",
                params![id.to_string()],
                artifact_from_row,
            )
            .optional()?;
        Ok(artifact)
    }

    async fn insert_assignments(&self, records: &[AssignmentRecord]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO assignments
                 (period_id, date, shift_type, person, specialty, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in records {
                written += stmt.execute(params![
                    record.period_id.to_string(),
                    record.date.format(DATE_FORMAT).to_string(),
                    record.shift_type.as_str(),
                    record.person,
                    record.specialty.as_str(),
                    record.source.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    async fn load_assignments_for_period(&self, period_id: Uuid) -> Result<Vec<AssignmentRecord>> {
        self.assignment_queries.fetch_add(1, Ordering::SeqCst);
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT period_id, date, shift_type, person, specialty, source
             FROM assignments WHERE period_id = ?1
             ORDER BY date, shift_type, person",
        )?;
        let records = stmt
            .query_map(params![period_id.to_string()], assignment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn save_coverage_decisions(
        &self,
        period_id: Uuid,
        decisions: &[CoverageDecision],
    ) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM coverage_decisions WHERE period_id = ?1",
            params![period_id.to_string()],
        )?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO coverage_decisions
                 (period_id, date, person, original_type, effective_type, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for decision in decisions {
                written += stmt.execute(params![
                    period_id.to_string(),
                    decision.date.format(DATE_FORMAT).to_string(),
                    decision.person,
                    decision.original_type.as_str(),
                    decision.effective_type.as_str(),
                    decision.reason,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    async fn load_coverage_decisions(&self, period_id: Uuid) -> Result<Vec<CoverageDecision>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT period_id, date, person, original_type, effective_type, reason
             FROM coverage_decisions WHERE period_id = ?1
             ORDER BY date, person, original_type",
        )?;
        let decisions = stmt
            .query_map(params![period_id.to_string()], decision_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decisions)
    }
}
