//! End-to-end import pipeline integration tests
//!
//! Tests the complete workflow:
//! 1. Spreadsheet upload and artifact creation
//! 2. External month-by-month scrape (mocked site)
//! 3. Coverage resolution over everything stored for the period

use rota::models::{RecordSource, ShiftType};
use rota::orchestrator::{OrchestrationStatus, PhaseStatus};
use rota::storage::{MemoryStore, ScheduleStore, SqliteStore};
use rota::validation::{codes, Phase};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::MockServer;

use super::fixtures::{
    fail_month, march_site_page, orchestrator, serve_month, MARCH_SPREADSHEET,
    TWO_MONTH_SPREADSHEET,
};

#[tokio::test]
async fn test_full_import_with_external_enrichment() {
    let server = MockServer::start().await;
    serve_month(&server, "2024-03", march_site_page()).await;
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&server.uri(), store.clone());

    let result = orchestrator
        .execute(
            Uuid::new_v4(),
            Uuid::new_v4(),
            MARCH_SPREADSHEET.as_bytes(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, OrchestrationStatus::Completed);
    assert!(!result.is_degraded());
    for phase in [
        Phase::SpreadsheetImport,
        Phase::ExternalImport,
        Phase::CoverageResolution,
    ] {
        assert_eq!(result.phase(phase).map(|p| p.status), Some(PhaseStatus::Succeeded));
    }

    let artifact = result.artifact.as_ref().unwrap();
    assert_eq!(artifact.start_month.key(), "2024-03");
    assert_eq!(artifact.month_count, 1);

    let stored = store.load_assignments_for_period(artifact.period_id).await.unwrap();
    assert_eq!(stored.len(), 9);
    assert_eq!(
        stored.iter().filter(|r| r.source == RecordSource::External).count(),
        3
    );

    // External readers cover every specialty, so nothing is reassigned
    assert_eq!(result.decisions.len(), 9);
    assert_eq!(result.reassigned_count(), 0);
    assert!(result.coverage.as_ref().unwrap().is_fully_covered());

    assert_eq!(result.validation.messages_by_code(codes::ROWS_IMPORTED).len(), 1);
    assert_eq!(
        result.validation.messages_by_code(codes::EXTERNAL_RECORDS_IMPORTED).len(),
        1
    );
    assert!(!result.validation.has_errors());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_site_down_still_completes() {
    let server = MockServer::start().await;
    fail_month(&server, "2024-03", 503).await;
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&server.uri(), store.clone());

    let result = orchestrator
        .execute(
            Uuid::new_v4(),
            Uuid::new_v4(),
            MARCH_SPREADSHEET.as_bytes(),
            &CancellationToken::new(),
        )
        .await
        .expect("external failure must not abort the import");

    assert_eq!(orchestrator.status(), OrchestrationStatus::Completed);
    assert!(result.artifact.is_some());
    assert_eq!(
        result.phase(Phase::ExternalImport).map(|p| p.status),
        Some(PhaseStatus::Degraded)
    );
    let warnings = result.validation.messages_by_code(codes::EXTERNAL_IMPORT_FAILED);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].phase, Some(Phase::ExternalImport));

    // Initial attempt plus three retries
    assert_eq!(server.received_requests().await.unwrap().len(), 4);

    // Only body readers left: the late mid shifts count as ON1
    assert_eq!(result.reassigned_count(), 2);
    let coverage = result.coverage.as_ref().unwrap();
    assert_eq!(coverage.detail(ShiftType::Overnight1).unwrap().assigned, 3);
    assert!(!result
        .validation
        .messages_by_code(codes::COVERAGE_GAP)
        .is_empty());
}

#[tokio::test]
async fn test_multi_month_import_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("rota.db");

    let server = MockServer::start().await;
    serve_month(&server, "2024-03", march_site_page()).await;
    fail_month(&server, "2024-04", 404).await;

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let orchestrator = orchestrator(&server.uri(), store.clone());

    let result = orchestrator
        .execute(
            Uuid::new_v4(),
            Uuid::new_v4(),
            TWO_MONTH_SPREADSHEET.as_bytes(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let artifact = result.artifact.clone().unwrap();
    assert_eq!(artifact.month_count, 2);
    assert_eq!(
        result.phase(Phase::ExternalImport).map(|p| p.status),
        Some(PhaseStatus::Degraded)
    );

    let failed = result.validation.messages_by_code(codes::PARTITION_FETCH_FAILED);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].context["partition"], "2024-04");
    assert_eq!(failed[0].context["status_code"], 404);

    assert_eq!(result.decisions.len(), 6);
    assert_eq!(result.reassigned_count(), 0);

    // Everything survives a reopen of the database file
    drop(orchestrator);
    drop(store);
    let reopened = SqliteStore::new(&db_path).unwrap();
    assert!(reopened.get_artifact(artifact.id).await.unwrap().is_some());
    assert_eq!(
        reopened
            .load_coverage_decisions(artifact.period_id)
            .await
            .unwrap()
            .len(),
        6
    );
}

#[tokio::test]
async fn test_reimport_creates_separate_periods() {
    let server = MockServer::start().await;
    serve_month(&server, "2024-03", march_site_page()).await;
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&server.uri(), store.clone());
    let hospital = Uuid::new_v4();
    let user = Uuid::new_v4();

    let first = orchestrator
        .execute(hospital, user, MARCH_SPREADSHEET.as_bytes(), &CancellationToken::new())
        .await
        .unwrap();
    let second = orchestrator
        .execute(hospital, user, MARCH_SPREADSHEET.as_bytes(), &CancellationToken::new())
        .await
        .unwrap();

    let first = first.artifact.unwrap();
    let second = second.artifact.unwrap();
    assert_ne!(first.period_id, second.period_id);
    assert_eq!(store.artifact_count(), 2);
    assert_eq!(
        store
            .load_assignments_for_period(second.period_id)
            .await
            .unwrap()
            .len(),
        9
    );
}
