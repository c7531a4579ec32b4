//! Phase 2: import shifts scraped from the external scheduling site

use super::{ExternalImport, ExternalImportReport};
use crate::crawler::{BatchFetchOutcome, ScheduleScraper};
use crate::error::{Error, Result};
use crate::models::{AssignmentRecord, RawShift, RecordSource, ScheduleArtifact, ShiftType, Specialty};
use crate::storage::SharedScheduleStore;
use crate::validation::{codes, context, ValidationResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Scrapes the artifact's months and stores the mappable shifts
pub struct ScrapeImporter {
    scraper: Arc<ScheduleScraper>,
    store: SharedScheduleStore,
}

impl ScrapeImporter {
    pub fn new(scraper: Arc<ScheduleScraper>, store: SharedScheduleStore) -> Self {
        Self { scraper, store }
    }

    /// Map a scraped row to an assignment; `None` when it has no person or
    /// an unknown shift type
    pub fn to_assignment(shift: &RawShift, artifact: &ScheduleArtifact) -> Option<AssignmentRecord> {
        let person = shift.person.as_deref()?.trim();
        if person.is_empty() {
            return None;
        }
        Some(AssignmentRecord {
            period_id: artifact.period_id,
            date: shift.date,
            shift_type: ShiftType::parse(&shift.shift_type)?,
            person: person.to_string(),
            specialty: Specialty::Both,
            source: RecordSource::External,
        })
    }

    fn report_outcome(outcome: &BatchFetchOutcome, validation: &mut ValidationResult) {
        for failure in &outcome.failures {
            validation.add_warning_with_context(
                codes::PARTITION_FETCH_FAILED,
                failure.to_string(),
                context([
                    ("partition", json!(failure.partition.key())),
                    ("url", json!(failure.url)),
                    ("kind", json!(failure.kind.as_str())),
                    ("status_code", json!(failure.status_code)),
                    ("attempts", json!(failure.attempts)),
                ]),
            );
        }
        if outcome.duplicate_count > 0 {
            validation.add_warning_with_context(
                codes::DUPLICATE_RECORDS,
                format!("{} duplicate records dropped", outcome.duplicate_count),
                context([("count", outcome.duplicate_count)]),
            );
        }
        for warning in &outcome.warnings {
            validation.add_warning(codes::EXTRACTION_WARNING, warning.clone());
        }
    }
}

#[async_trait]
impl ExternalImport for ScrapeImporter {
    async fn import_external(
        &self,
        artifact: &ScheduleArtifact,
        token: &CancellationToken,
    ) -> Result<ExternalImportReport> {
        let outcome = match self
            .scraper
            .scrape_schedule(artifact.start_month, artifact.month_count, token)
            .await
        {
            Ok(outcome) => outcome,
            // Partial success below the policy still carries usable records
            Err(Error::InsufficientSuccess { outcome, .. }) => {
                warn!(
                    processed = outcome.months_processed,
                    failed = outcome.months_failed,
                    "external import below success policy"
                );
                *outcome
            }
            Err(e) => return Err(e),
        };

        let mut validation = ValidationResult::new();
        Self::report_outcome(&outcome, &mut validation);

        let mut records = Vec::with_capacity(outcome.records.len());
        for shift in &outcome.records {
            match Self::to_assignment(shift, artifact) {
                Some(record) => records.push(record),
                None => validation.add_warning_with_context(
                    codes::UNMAPPED_EXTERNAL_SHIFT,
                    format!("{} {} has no mappable assignment", shift.date, shift.shift_type),
                    context([
                        ("date", json!(shift.date.to_string())),
                        ("shift_type", json!(shift.shift_type)),
                        ("row", json!(shift.row)),
                    ]),
                ),
            }
        }

        let records_imported = if records.is_empty() {
            0
        } else {
            self.store.insert_assignments(&records).await?
        };
        validation.add_info_with_context(
            codes::EXTERNAL_RECORDS_IMPORTED,
            format!("{records_imported} external assignments imported"),
            context([("count", records_imported)]),
        );
        validation.set_context("months_processed", outcome.months_processed);
        validation.set_context("months_failed", outcome.months_failed);
        validation.set_context("fetch_elapsed_ms", outcome.elapsed_ms);

        info!(
            artifact = %artifact.id,
            imported = records_imported,
            failed_months = outcome.months_failed,
            "external import finished"
        );

        Ok(ExternalImportReport {
            records_imported,
            months_processed: outcome.months_processed,
            months_failed: outcome.months_failed,
            duplicate_count: outcome.duplicate_count,
            validation,
        })
    }
}
