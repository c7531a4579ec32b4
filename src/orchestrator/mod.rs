//! Three-phase import orchestration
//!
//! ```text
//!   identifiers ──► phase 1: spreadsheet ──► phase 2: external ──► phase 3: coverage
//!       │                  │                        │                      │
//!    critical           critical                 degraded               degraded
//! ```
//!
//! Critical failures abort the run with [`Error::Critical`] and leave the
//! status `Failed`; phases after it never run. Degraded failures become
//! warnings in the merged validation and the run still completes with the
//! phase-1 artifact. Phases run sequentially on the caller's task.

pub mod result;
pub mod status;

pub use result::{OrchestrationResult, PhaseReport, PhaseStatus};
pub use status::{OrchestrationStatus, StatusCell};

use crate::coverage::{CoverageMetrics, CoverageService};
use crate::error::{Error, Result, RotaErrorTrait};
use crate::import::{ExternalImport, ImportRequest, SpreadsheetImporter};
use crate::models::{CoverageDecision, ScheduleArtifact};
use crate::validation::{codes, context, Phase, ValidationResult};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// State accumulated while one run is in flight
struct Run {
    started: Instant,
    validation: ValidationResult,
    phases: Vec<PhaseReport>,
}

impl Run {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            validation: ValidationResult::new(),
            phases: Vec::new(),
        }
    }

    /// Fold a phase's own validation in and record its timing
    fn finish_phase(
        &mut self,
        phase: Phase,
        status: PhaseStatus,
        started: Instant,
        mut validation: ValidationResult,
    ) {
        let duration_ms = started.elapsed().as_millis() as u64;
        validation.set_context("duration_ms", duration_ms);
        validation.set_context("status", status.as_str());
        self.validation.merge_from(phase, validation);
        self.phases.push(PhaseReport {
            phase,
            status,
            duration_ms,
        });
    }

    fn skip(&mut self, phases: &[Phase]) {
        for phase in phases {
            self.validation
                .set_context(format!("{phase}.status"), PhaseStatus::Skipped.as_str());
            self.phases.push(PhaseReport {
                phase: *phase,
                status: PhaseStatus::Skipped,
                duration_ms: 0,
            });
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn stamp(&mut self) {
        let completed = self
            .phases
            .iter()
            .filter(|p| matches!(p.status, PhaseStatus::Succeeded | PhaseStatus::Degraded))
            .count();
        let duration_ms = self.elapsed_ms();
        self.validation.set_context("duration_ms", duration_ms);
        self.validation.set_context("phases_completed", completed);
    }

    fn critical(mut self, phase: Phase, reason: impl Into<String>) -> Error {
        self.stamp();
        Error::Critical {
            phase,
            reason: reason.into(),
            validation: Box::new(self.validation),
        }
    }
}

/// Warning-only validation for a phase that returned an error
fn degraded_validation(code: &str, error: &Error) -> ValidationResult {
    let mut validation = ValidationResult::new();
    validation.add_warning_with_context(
        code,
        error.to_string(),
        context([
            ("category", json!(error.category().as_str())),
            ("recoverable", json!(error.is_recoverable())),
        ]),
    );
    validation
}

/// Sequences spreadsheet import, external import and coverage resolution
pub struct ImportOrchestrator {
    spreadsheet: Arc<dyn SpreadsheetImporter>,
    external: Arc<dyn ExternalImport>,
    coverage: Arc<dyn CoverageService>,
    status: StatusCell,
}

impl ImportOrchestrator {
    pub fn new(
        spreadsheet: Arc<dyn SpreadsheetImporter>,
        external: Arc<dyn ExternalImport>,
        coverage: Arc<dyn CoverageService>,
    ) -> Self {
        Self {
            spreadsheet,
            external,
            coverage,
            status: StatusCell::new(),
        }
    }

    /// Current status; never blocks, safe to call while `execute` runs
    pub fn status(&self) -> OrchestrationStatus {
        self.status.get()
    }

    /// Run all three phases for one upload.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyRunning` if another `execute` is in flight
    /// - `Error::Critical` for missing identifiers or a phase-1 failure;
    ///   the attached validation explains what went wrong
    #[instrument(skip(self, content, token), fields(bytes = content.len()))]
    pub async fn execute(
        &self,
        hospital_id: Uuid,
        user_id: Uuid,
        content: &[u8],
        token: &CancellationToken,
    ) -> Result<OrchestrationResult> {
        if self.status.try_start().is_err() {
            warn!("rejecting execute: a run is already in flight");
            return Err(Error::AlreadyRunning);
        }

        let result = self.run(hospital_id, user_id, content, token).await;
        match &result {
            Ok(outcome) => {
                self.status.set(OrchestrationStatus::Completed);
                info!(
                    duration_ms = outcome.duration_ms,
                    degraded = outcome.is_degraded(),
                    summary = %outcome.validation.summary(),
                    "orchestration completed"
                );
            }
            Err(e) => {
                self.status.set(OrchestrationStatus::Failed);
                error!(error = %e, "orchestration failed");
            }
        }
        result
    }

    async fn run(
        &self,
        hospital_id: Uuid,
        user_id: Uuid,
        content: &[u8],
        token: &CancellationToken,
    ) -> Result<OrchestrationResult> {
        let mut run = Run::new();

        // Identifiers
        let input = Self::validate_identifiers(hospital_id, user_id);
        if input.has_errors() {
            let started = Instant::now();
            run.finish_phase(Phase::Input, PhaseStatus::Failed, started, input);
            run.skip(&[
                Phase::SpreadsheetImport,
                Phase::ExternalImport,
                Phase::CoverageResolution,
            ]);
            return Err(run.critical(Phase::Input, "missing identifiers"));
        }

        // Phase 1
        let artifact = match self.import_spreadsheet(&mut run, hospital_id, user_id, content).await {
            Ok(artifact) => artifact,
            Err(reason) => {
                run.skip(&[Phase::ExternalImport, Phase::CoverageResolution]);
                return Err(run.critical(Phase::SpreadsheetImport, reason));
            }
        };

        // Phase 2
        self.import_external(&mut run, &artifact, token).await;

        // Phase 3
        let (decisions, coverage) = self.resolve_coverage(&mut run, &artifact, token).await;

        run.stamp();
        let duration_ms = run.elapsed_ms();
        Ok(OrchestrationResult {
            artifact: Some(artifact),
            decisions,
            coverage,
            phases: run.phases,
            validation: run.validation,
            status: OrchestrationStatus::Completed,
            duration_ms,
            completed_at: Utc::now(),
        })
    }

    fn validate_identifiers(hospital_id: Uuid, user_id: Uuid) -> ValidationResult {
        let mut validation = ValidationResult::new();
        if hospital_id.is_nil() {
            validation.add_error(codes::MISSING_HOSPITAL_ID, "hospital id is required");
        }
        if user_id.is_nil() {
            validation.add_error(codes::MISSING_USER_ID, "user id is required");
        }
        validation
    }

    /// Phase 1; `Err` carries the reason for the critical failure
    async fn import_spreadsheet(
        &self,
        run: &mut Run,
        hospital_id: Uuid,
        user_id: Uuid,
        content: &[u8],
    ) -> std::result::Result<ScheduleArtifact, String> {
        let started = Instant::now();
        let request = ImportRequest {
            hospital_id,
            user_id,
        };
        info!(phase = %Phase::SpreadsheetImport, "phase started");

        match self.spreadsheet.import(&request, content).await {
            Ok(import) => {
                let has_errors = import.validation.has_errors();
                match import.artifact {
                    Some(artifact) if !has_errors => {
                        run.finish_phase(
                            Phase::SpreadsheetImport,
                            PhaseStatus::Succeeded,
                            started,
                            import.validation,
                        );
                        Ok(artifact)
                    }
                    _ => {
                        let reason = format!(
                            "spreadsheet rejected: {}",
                            import.validation.summary()
                        );
                        run.finish_phase(
                            Phase::SpreadsheetImport,
                            PhaseStatus::Failed,
                            started,
                            import.validation,
                        );
                        Err(reason)
                    }
                }
            }
            Err(e) => {
                let mut validation = ValidationResult::new();
                validation.add_error_with_context(
                    codes::SPREADSHEET_IMPORT_FAILED,
                    e.to_string(),
                    context([("category", e.category().as_str())]),
                );
                run.finish_phase(
                    Phase::SpreadsheetImport,
                    PhaseStatus::Failed,
                    started,
                    validation,
                );
                Err(e.to_string())
            }
        }
    }

    async fn import_external(
        &self,
        run: &mut Run,
        artifact: &ScheduleArtifact,
        token: &CancellationToken,
    ) {
        let started = Instant::now();
        info!(phase = %Phase::ExternalImport, "phase started");

        match self.external.import_external(artifact, token).await {
            Ok(report) => {
                let status = if report.months_failed > 0 {
                    PhaseStatus::Degraded
                } else {
                    PhaseStatus::Succeeded
                };
                run.finish_phase(Phase::ExternalImport, status, started, report.validation);
            }
            Err(e) => {
                warn!(error = %e, "external import degraded");
                run.finish_phase(
                    Phase::ExternalImport,
                    PhaseStatus::Degraded,
                    started,
                    degraded_validation(codes::EXTERNAL_IMPORT_FAILED, &e),
                );
            }
        }
    }

    async fn resolve_coverage(
        &self,
        run: &mut Run,
        artifact: &ScheduleArtifact,
        token: &CancellationToken,
    ) -> (Vec<CoverageDecision>, Option<CoverageMetrics>) {
        let started = Instant::now();
        info!(phase = %Phase::CoverageResolution, "phase started");

        match self.coverage.resolve_coverage(artifact, token).await {
            Ok(report) => {
                run.finish_phase(
                    Phase::CoverageResolution,
                    PhaseStatus::Succeeded,
                    started,
                    report.validation,
                );
                (report.decisions, Some(report.metrics))
            }
            Err(e) => {
                warn!(error = %e, "coverage resolution degraded");
                run.finish_phase(
                    Phase::CoverageResolution,
                    PhaseStatus::Degraded,
                    started,
                    degraded_validation(codes::COVERAGE_RESOLUTION_FAILED, &e),
                );
                (Vec::new(), None)
            }
        }
    }
}
