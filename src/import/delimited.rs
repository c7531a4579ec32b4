//! Delimited-text spreadsheet importer
//!
//! Accepts tab- or comma-separated text with a header row naming at least
//! `date`, `shift_type` and `person`; `specialty` is optional and defaults to
//! `BOTH`. Column order is free. Row problems are collected as validation
//! messages with `row` and `column` context; the artifact is created only
//! when no errors were found.

use super::{ImportRequest, SpreadsheetImport, SpreadsheetImporter};
use crate::error::{Error, Result};
use crate::models::{AssignmentRecord, Partition, RecordSource, ScheduleArtifact, ShiftType, Specialty};
use crate::parser::parse_date;
use crate::storage::SharedScheduleStore;
use crate::validation::{codes, context, ValidationResult};
use async_trait::async_trait;
use csv::StringRecord;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

const REQUIRED_COLUMNS: [&str; 3] = ["date", "shift_type", "person"];

/// Column positions resolved from the header row
#[derive(Debug, Clone, Copy)]
struct Columns {
    date: usize,
    shift_type: usize,
    person: usize,
    specialty: Option<usize>,
}

impl Columns {
    fn from_header(header: &StringRecord) -> std::result::Result<Self, Vec<&'static str>> {
        let names: Vec<String> = header
            .iter()
            .map(|h| h.trim().to_ascii_lowercase().replace([' ', '-'], "_"))
            .collect();
        let find = |name: &str| names.iter().position(|n| n == name);

        let missing: Vec<&'static str> = REQUIRED_COLUMNS
            .into_iter()
            .filter(|c| find(*c).is_none())
            .collect();
        match (find("date"), find("shift_type"), find("person")) {
            (Some(date), Some(shift_type), Some(person)) => Ok(Self {
                date,
                shift_type,
                person,
                specialty: find("specialty"),
            }),
            _ => Err(missing),
        }
    }
}

/// Rows turned into records, before anything is stored
#[derive(Debug, Default)]
struct ParsedSheet {
    records: Vec<AssignmentRecord>,
    validation: ValidationResult,
}

/// Imports delimited text into a [`ScheduleStore`](crate::storage::ScheduleStore)
pub struct DelimitedImporter {
    store: SharedScheduleStore,
}

impl DelimitedImporter {
    pub fn new(store: SharedScheduleStore) -> Self {
        Self { store }
    }

    fn delimiter(text: &str) -> u8 {
        let header = text.lines().next().unwrap_or_default();
        if header.contains('\t') {
            b'\t'
        } else {
            b','
        }
    }

    fn cell(record: &StringRecord, index: usize) -> &str {
        record.get(index).map(str::trim).unwrap_or_default()
    }

    /// Parse rows into records under a placeholder period id
    fn parse(text: &str) -> Result<ParsedSheet> {
        let mut sheet = ParsedSheet::default();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(Self::delimiter(text))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let header = reader
            .headers()
            .map_err(|e| Error::Import(format!("unreadable header: {e}")))?
            .clone();
        if header.iter().all(str::is_empty) {
            sheet
                .validation
                .add_error(codes::EMPTY_SPREADSHEET, "spreadsheet has no header row");
            return Ok(sheet);
        }

        let columns = match Columns::from_header(&header) {
            Ok(columns) => columns,
            Err(missing) => {
                for column in missing {
                    sheet.validation.add_error_with_context(
                        codes::MISSING_COLUMN,
                        format!("required column '{column}' is missing"),
                        context([("column", column)]),
                    );
                }
                return Ok(sheet);
            }
        };

        let mut seen = HashSet::new();
        for (index, row) in reader.records().enumerate() {
            let record = row.map_err(|e| Error::Import(format!("unreadable row: {e}")))?;
            let row_number = record
                .position()
                .map_or(index + 2, |p| p.line() as usize);
            if record.iter().all(str::is_empty) {
                continue;
            }
            if let Some(assignment) = Self::parse_row(&record, row_number, columns, &mut sheet.validation) {
                let key = (assignment.date, assignment.shift_type, assignment.person.clone());
                if seen.insert(key) {
                    sheet.records.push(assignment);
                } else {
                    sheet.validation.add_warning_with_context(
                        codes::DUPLICATE_ROW,
                        format!("row {row_number} repeats an earlier assignment"),
                        context([("row", row_number)]),
                    );
                }
            }
        }

        if sheet.records.is_empty() && !sheet.validation.has_errors() {
            sheet
                .validation
                .add_error(codes::EMPTY_SPREADSHEET, "spreadsheet has no assignment rows");
        }
        Ok(sheet)
    }

    fn parse_row(
        record: &StringRecord,
        row: usize,
        columns: Columns,
        validation: &mut ValidationResult,
    ) -> Option<AssignmentRecord> {
        let locate = |column: &str, value: &str| {
            context([
                ("row", json!(row)),
                ("column", json!(column)),
                ("value", json!(value)),
            ])
        };
        let mut valid = true;

        let raw_date = Self::cell(record, columns.date);
        let date = parse_date(raw_date);
        if date.is_none() {
            validation.add_error_with_context(
                codes::INVALID_DATE,
                format!("row {row}: invalid date '{raw_date}'"),
                locate("date", raw_date),
            );
            valid = false;
        }

        let raw_shift = Self::cell(record, columns.shift_type);
        let shift_type = ShiftType::parse(raw_shift);
        if shift_type.is_none() {
            validation.add_error_with_context(
                codes::UNKNOWN_SHIFT_TYPE,
                format!("row {row}: unknown shift type '{raw_shift}'"),
                locate("shift_type", raw_shift),
            );
            valid = false;
        }

        let person = Self::cell(record, columns.person);
        if person.is_empty() {
            validation.add_error_with_context(
                codes::MISSING_PERSON,
                format!("row {row}: no person assigned"),
                locate("person", person),
            );
            valid = false;
        }

        let raw_specialty = columns
            .specialty
            .map(|i| Self::cell(record, i))
            .unwrap_or_default();
        let specialty = Specialty::parse(raw_specialty).unwrap_or_else(|| {
            validation.add_warning_with_context(
                codes::UNKNOWN_SPECIALTY,
                format!("row {row}: unknown specialty '{raw_specialty}', assuming BOTH"),
                locate("specialty", raw_specialty),
            );
            Specialty::Both
        });

        match (valid, date, shift_type) {
            (true, Some(date), Some(shift_type)) => Some(AssignmentRecord {
                period_id: uuid::Uuid::nil(),
                date,
                shift_type,
                person: person.to_string(),
                specialty,
                source: RecordSource::Spreadsheet,
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl SpreadsheetImporter for DelimitedImporter {
    async fn import(&self, request: &ImportRequest, content: &[u8]) -> Result<SpreadsheetImport> {
        let text = std::str::from_utf8(content)
            .map_err(|e| Error::Import(format!("spreadsheet is not valid UTF-8: {e}")))?;
        let text = text.trim_start_matches('\u{feff}');

        let ParsedSheet {
            mut records,
            mut validation,
        } = Self::parse(text)?;

        if validation.has_errors() {
            debug!(errors = validation.error_count(), "spreadsheet rejected");
            return Ok(SpreadsheetImport {
                artifact: None,
                rows_imported: 0,
                validation,
            });
        }

        let (Some(first), Some(last)) = (
            records.iter().map(|r| r.date).min(),
            records.iter().map(|r| r.date).max(),
        ) else {
            return Err(Error::Import("no dated rows".to_string()));
        };
        let start = Partition::from_date(first);
        let artifact = ScheduleArtifact::new(
            request.hospital_id,
            request.user_id,
            start,
            start.months_through(Partition::from_date(last)),
        );

        for record in &mut records {
            record.period_id = artifact.period_id;
        }
        self.store.create_artifact(&artifact).await?;
        let rows_imported = self.store.insert_assignments(&records).await?;

        validation.add_info_with_context(
            codes::ROWS_IMPORTED,
            format!("{rows_imported} assignments imported"),
            context([("rows", rows_imported)]),
        );
        validation.set_context("artifact_id", artifact.id.to_string());
        validation.set_context("period_id", artifact.period_id.to_string());
        validation.set_context("months", artifact.month_count);

        info!(
            artifact = %artifact.id,
            rows = rows_imported,
            start = %artifact.start_month,
            months = artifact.month_count,
            "spreadsheet imported"
        );

        Ok(SpreadsheetImport {
            artifact: Some(artifact),
            rows_imported,
            validation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, ScheduleStore};
    use std::sync::Arc;
    use uuid::Uuid;

    fn request() -> ImportRequest {
        ImportRequest {
            hospital_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_imports_comma_separated() {
        let store = Arc::new(MemoryStore::new());
        let importer = DelimitedImporter::new(store.clone());
        let content = "date,shift_type,person,specialty\n\
                       2024-03-30,ON1,Ana,BODY_ONLY\n\
                       2024-04-02,MidL,Ben,\n";

        let result = importer.import(&request(), content.as_bytes()).await.unwrap();
        let artifact = result.artifact.unwrap();
        assert_eq!(result.rows_imported, 2);
        assert_eq!(artifact.start_month, Partition::new(2024, 3).unwrap());
        assert_eq!(artifact.month_count, 2);
        assert!(result.validation.is_valid());

        let stored = store.load_assignments_for_period(artifact.period_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].specialty, Specialty::Both);
    }

    #[tokio::test]
    async fn test_tab_separated_with_reordered_columns() {
        let store = Arc::new(MemoryStore::new());
        let importer = DelimitedImporter::new(store);
        let content = "Person\tDate\tShift Type\nAna\t03/01/2024\tDAY\n";

        let result = importer.import(&request(), content.as_bytes()).await.unwrap();
        assert_eq!(result.rows_imported, 1);
    }

    #[tokio::test]
    async fn test_row_errors_carry_locator_and_block_artifact() {
        let store = Arc::new(MemoryStore::new());
        let importer = DelimitedImporter::new(store.clone());
        let content = "date,shift_type,person\n2024-03-01,ON1,Ana\nnot-a-date,XYZ,\n";

        let result = importer.import(&request(), content.as_bytes()).await.unwrap();
        assert!(result.artifact.is_none());
        assert_eq!(store.artifact_count(), 0);

        let v = &result.validation;
        assert_eq!(v.error_count(), 3);
        let date_errors = v.messages_by_code(codes::INVALID_DATE);
        let date_error = date_errors[0];
        assert_eq!(date_error.context.get("row"), Some(&json!(3)));
        assert_eq!(date_error.context.get("column"), Some(&json!("date")));
        assert_eq!(v.messages_by_code(codes::MISSING_PERSON).len(), 1);
    }

    #[tokio::test]
    async fn test_missing_column_and_duplicates() {
        let importer = DelimitedImporter::new(Arc::new(MemoryStore::new()));
        let missing = importer
            .import(&request(), b"date,person\n2024-03-01,Ana\n")
            .await
            .unwrap();
        assert_eq!(missing.validation.messages_by_code(codes::MISSING_COLUMN).len(), 1);

        let dupes = importer
            .import(
                &request(),
                b"date,shift_type,person,specialty\n2024-03-01,ON1,Ana,NEURO\n2024-03-01,ON1,Ana,NEURO\n2024-03-01,ON2,Cy,SPINE\n",
            )
            .await
            .unwrap();
        assert_eq!(dupes.rows_imported, 2);
        assert_eq!(dupes.validation.messages_by_code(codes::DUPLICATE_ROW).len(), 1);
        assert_eq!(dupes.validation.messages_by_code(codes::UNKNOWN_SPECIALTY).len(), 1);
        assert!(dupes.artifact.is_some());
    }

    #[tokio::test]
    async fn test_empty_and_unreadable_input() {
        let importer = DelimitedImporter::new(Arc::new(MemoryStore::new()));

        let empty = importer.import(&request(), b"").await.unwrap();
        assert_eq!(empty.validation.messages_by_code(codes::EMPTY_SPREADSHEET).len(), 1);

        let header_only = importer
            .import(&request(), b"date,shift_type,person\n")
            .await
            .unwrap();
        assert!(header_only.artifact.is_none());

        let binary = importer.import(&request(), &[0xff, 0xfe, 0x00, 0x81]).await;
        assert!(matches!(binary, Err(Error::Import(_))));
    }
}
