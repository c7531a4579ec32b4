//! Import phases 1 and 2
//!
//! Phase 1 turns an uploaded spreadsheet into a [`ScheduleArtifact`] and its
//! assignments. Phase 2 enriches the artifact with shifts scraped from the
//! external scheduling site. Both report through a [`ValidationResult`];
//! only input that cannot be read at all is returned as an `Err`.

pub mod delimited;
pub mod external;

pub use delimited::DelimitedImporter;
pub use external::ScrapeImporter;

use crate::error::Result;
use crate::models::ScheduleArtifact;
use crate::validation::ValidationResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Who is importing, for whom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub hospital_id: Uuid,
    pub user_id: Uuid,
}

/// Result of phase 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadsheetImport {
    /// Absent when validation found errors
    pub artifact: Option<ScheduleArtifact>,
    pub rows_imported: usize,
    pub validation: ValidationResult,
}

/// Result of phase 2
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalImportReport {
    pub records_imported: usize,
    pub months_processed: usize,
    pub months_failed: usize,
    pub duplicate_count: usize,
    pub validation: ValidationResult,
}

/// Phase 1: spreadsheet upload
#[async_trait]
pub trait SpreadsheetImporter: Send + Sync {
    async fn import(&self, request: &ImportRequest, content: &[u8]) -> Result<SpreadsheetImport>;
}

/// Phase 2: external site import for an existing artifact
#[async_trait]
pub trait ExternalImport: Send + Sync {
    async fn import_external(
        &self,
        artifact: &ScheduleArtifact,
        token: &CancellationToken,
    ) -> Result<ExternalImportReport>;
}
