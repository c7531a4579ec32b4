//! Error scenario integration tests
//!
//! Critical failures must stop the run before anything touches the external
//! site; degraded failures must never cost the imported artifact.

use rota::error::{Error, ErrorCategory, RotaErrorTrait};
use rota::orchestrator::{OrchestrationStatus, PhaseStatus};
use rota::storage::MemoryStore;
use rota::validation::{codes, Phase, ValidationResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::MockServer;

use super::fixtures::{
    march_site_page, orchestrator, serve_month, BROKEN_SPREADSHEET, HEADERLESS_SPREADSHEET,
    MARCH_SPREADSHEET,
};

fn critical_validation(err: &Error, expected: Phase) -> &ValidationResult {
    match err {
        Error::Critical {
            phase, validation, ..
        } => {
            assert_eq!(*phase, expected);
            &**validation
        }
        other => panic!("expected critical failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_broken_rows_abort_before_scraping() {
    let server = MockServer::start().await;
    serve_month(&server, "2024-03", march_site_page()).await;
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&server.uri(), store.clone());

    let err = orchestrator
        .execute(
            Uuid::new_v4(),
            Uuid::new_v4(),
            BROKEN_SPREADSHEET.as_bytes(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Orchestration);
    assert!(!err.is_recoverable());
    let validation = critical_validation(&err, Phase::SpreadsheetImport);

    let dates = validation.messages_by_code(codes::INVALID_DATE);
    assert_eq!(dates.len(), 1);
    assert!(dates[0].context.contains_key("row"));
    assert_eq!(dates[0].phase, Some(Phase::SpreadsheetImport));
    assert_eq!(validation.messages_by_code(codes::UNKNOWN_SHIFT_TYPE).len(), 1);

    assert_eq!(orchestrator.status(), OrchestrationStatus::Failed);
    assert_eq!(store.artifact_count(), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_column_is_critical() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&server.uri(), store);

    let err = orchestrator
        .execute(
            Uuid::new_v4(),
            Uuid::new_v4(),
            HEADERLESS_SPREADSHEET.as_bytes(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let validation = critical_validation(&err, Phase::SpreadsheetImport);
    let missing = validation.messages_by_code(codes::MISSING_COLUMN);
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].context["column"], "person");
}

#[tokio::test]
async fn test_unreadable_upload_is_critical() {
    let server = MockServer::start().await;
    let orchestrator = orchestrator(&server.uri(), Arc::new(MemoryStore::new()));

    let err = orchestrator
        .execute(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &[0xff, 0xfe, 0x00, 0x41],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let validation = critical_validation(&err, Phase::SpreadsheetImport);
    assert_eq!(
        validation
            .messages_by_code(codes::SPREADSHEET_IMPORT_FAILED)
            .len(),
        1
    );
}

#[tokio::test]
async fn test_empty_upload_is_critical() {
    let server = MockServer::start().await;
    let orchestrator = orchestrator(&server.uri(), Arc::new(MemoryStore::new()));

    let err = orchestrator
        .execute(Uuid::new_v4(), Uuid::new_v4(), b"", &CancellationToken::new())
        .await
        .unwrap_err();

    let validation = critical_validation(&err, Phase::SpreadsheetImport);
    assert!(!validation
        .messages_by_code(codes::EMPTY_SPREADSHEET)
        .is_empty());
}

#[tokio::test]
async fn test_cancelled_run_keeps_artifact() {
    let server = MockServer::start().await;
    serve_month(&server, "2024-03", march_site_page()).await;
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&server.uri(), store.clone());

    let token = CancellationToken::new();
    token.cancel();

    let result = orchestrator
        .execute(
            Uuid::new_v4(),
            Uuid::new_v4(),
            MARCH_SPREADSHEET.as_bytes(),
            &token,
        )
        .await
        .expect("cancellation after phase 1 is not critical");

    assert_eq!(result.status, OrchestrationStatus::Completed);
    assert!(result.artifact.is_some());
    assert_eq!(store.artifact_count(), 1);
    assert_eq!(
        result.phase(Phase::ExternalImport).map(|p| p.status),
        Some(PhaseStatus::Degraded)
    );
    assert_eq!(
        result.phase(Phase::CoverageResolution).map(|p| p.status),
        Some(PhaseStatus::Degraded)
    );
    assert!(result.coverage.is_none());
    assert!(result.decisions.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}
