//! HTML extraction of schedule rows
//!
//! Turns a fetched page body into [`RawShift`] records. Extraction is pure:
//! no I/O, and row-level problems are returned as warnings rather than
//! failing the page. A page that has no schedule table at all is an error.

pub mod selectors;
pub mod table;

pub use selectors::ColumnLayout;
pub use table::TableExtractor;

use crate::models::RawShift;
use crate::utils::error::ExtractError;
use chrono::NaiveDate;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%d %b %Y", "%b %d, %Y"];

/// Parse a schedule date in any of the formats seen on rosters
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Records pulled from one page plus anything odd noticed on the way
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub shifts: Vec<RawShift>,
    pub warnings: Vec<String>,
}

/// Converts a page body into raw shift records
pub trait ScheduleExtractor: Send + Sync {
    fn extract(&self, body: &str) -> Result<Extraction, ExtractError>;
}
