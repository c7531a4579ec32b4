//! Table-row schedule extractor

use super::selectors::{self, ColumnLayout, CELL, DEFAULT_ROW, HEADER_CELL, TABLE};
use super::{parse_date, Extraction, ScheduleExtractor};
use crate::models::RawShift;
use crate::utils::error::ExtractError;
use crate::utils::normalize_whitespace;
use scraper::{ElementRef, Html, Selector};

/// Extracts one shift per table row
#[derive(Debug, Clone)]
pub struct TableExtractor {
    row: Selector,
    layout: ColumnLayout,
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self {
            row: DEFAULT_ROW.clone(),
            layout: ColumnLayout::default(),
        }
    }
}

impl TableExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom row selector and column layout
    pub fn with_layout(row_selector: &str, layout: ColumnLayout) -> Result<Self, ExtractError> {
        Ok(Self {
            row: selectors::compile(row_selector)?,
            layout,
        })
    }

    fn is_header(row: &ElementRef<'_>, cells: &[String], layout: &ColumnLayout) -> bool {
        row.select(&HEADER_CELL).next().is_some()
            || cells
                .get(layout.date)
                .is_some_and(|c| c.eq_ignore_ascii_case("date"))
    }

    fn optional(cells: &[String], index: usize) -> Option<String> {
        cells.get(index).filter(|c| !c.is_empty()).cloned()
    }
}

impl ScheduleExtractor for TableExtractor {
    fn extract(&self, body: &str) -> Result<Extraction, ExtractError> {
        let document = Html::parse_document(body);
        if document.select(&TABLE).next().is_none() {
            return Err(ExtractError::TableNotFound);
        }

        let layout = &self.layout;
        let mut extraction = Extraction::default();

        for (index, row) in document.select(&self.row).enumerate() {
            let row_number = index + 1;
            let cells: Vec<String> = row
                .select(&CELL)
                .map(|cell| normalize_whitespace(&cell.text().collect::<String>()))
                .collect();

            if cells.iter().all(String::is_empty) || Self::is_header(&row, &cells, layout) {
                continue;
            }

            if cells.len() < layout.min_cells() {
                extraction.warnings.push(format!(
                    "row {row_number}: expected at least {} cells, found {}",
                    layout.min_cells(),
                    cells.len()
                ));
                continue;
            }

            let raw_date = &cells[layout.date];
            let Some(date) = parse_date(raw_date) else {
                extraction.warnings.push(format!(
                    "row {row_number}, column {}: unparseable date '{raw_date}'",
                    layout.column_name(layout.date)
                ));
                continue;
            };

            let shift_type = cells[layout.shift_type].clone();
            if shift_type.is_empty() {
                extraction.warnings.push(format!(
                    "row {row_number}, column {}: missing shift type",
                    layout.column_name(layout.shift_type)
                ));
                continue;
            }

            let required_staffing = match Self::optional(&cells, layout.required_staffing) {
                Some(raw) => match raw.parse::<u32>() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        extraction.warnings.push(format!(
                            "row {row_number}, column {}: not a number '{raw}'",
                            layout.column_name(layout.required_staffing)
                        ));
                        None
                    }
                },
                None => None,
            };

            extraction.shifts.push(RawShift {
                date,
                shift_type,
                person: layout.person.and_then(|i| Self::optional(&cells, i)),
                start_time: Self::optional(&cells, layout.start_time),
                end_time: Self::optional(&cells, layout.end_time),
                location: Self::optional(&cells, layout.location),
                required_staffing,
                row: row_number,
            });
        }

        Ok(extraction)
    }
}
