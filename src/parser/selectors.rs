//! CSS selectors and column layout for schedule tables

use crate::utils::error::ExtractError;
use lazy_static::lazy_static;
use scraper::Selector;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    pub(crate) static ref TABLE: Selector = parse_selector!("table");
    pub(crate) static ref DEFAULT_ROW: Selector = parse_selector!("table tbody tr");
    pub(crate) static ref CELL: Selector = parse_selector!("td, th");
    pub(crate) static ref HEADER_CELL: Selector = parse_selector!("th");
}

/// Parse a user-supplied selector
pub fn compile(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// 0-based cell positions of each field within a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date: usize,
    pub shift_type: usize,
    pub start_time: usize,
    pub end_time: usize,
    pub location: usize,
    pub required_staffing: usize,
    pub person: Option<usize>,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            date: 0,
            shift_type: 1,
            start_time: 2,
            end_time: 3,
            location: 4,
            required_staffing: 5,
            person: Some(6),
        }
    }
}

impl ColumnLayout {
    /// Minimum cells a row needs to carry the mandatory fields
    pub fn min_cells(&self) -> usize {
        self.date.max(self.shift_type) + 1
    }

    pub fn column_name(&self, index: usize) -> &'static str {
        match index {
            i if i == self.date => "date",
            i if i == self.shift_type => "shift_type",
            i if i == self.start_time => "start_time",
            i if i == self.end_time => "end_time",
            i if i == self.location => "location",
            i if i == self.required_staffing => "required_staffing",
            i if Some(i) == self.person => "person",
            _ => "unknown",
        }
    }
}
