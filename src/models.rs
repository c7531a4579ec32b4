// Core data structures for the schedule import engine

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// One month of schedule data, fetched independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Partition {
    year: i32,
    month: u32,
}

impl Partition {
    /// Create a partition; `month` is 1-based
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Partition containing the given date
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse a `YYYY-MM` key
    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.trim().split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Following month, rolling over into the next year after December
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// `count` consecutive months starting at `start`, without repeats
    pub fn range(start: Self, count: u32) -> Vec<Self> {
        let mut seen = HashSet::new();
        let mut months = Vec::with_capacity(count as usize);
        let mut current = start;
        for _ in 0..count {
            if seen.insert(current) {
                months.push(current);
            }
            current = current.next();
        }
        months
    }

    /// Months from `self` through `end` inclusive, 0 if `end` is earlier
    pub fn months_through(&self, end: Partition) -> u32 {
        let index = |p: &Partition| i64::from(p.year) * 12 + i64::from(p.month);
        u32::try_from(index(&end) - index(self) + 1).unwrap_or(0)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// `YYYY-MM` key used in URLs and logs
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Expand a path template, substituting `{month}` with the key
    pub fn path(&self, template: &str) -> String {
        template.replace("{month}", &self.key())
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl TryFrom<String> for Partition {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid month key: {value}"))
    }
}

impl From<Partition> for String {
    fn from(p: Partition) -> Self {
        p.key()
    }
}

/// Unit of work for the fetcher: one partition and where to get it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub partition: Partition,
    pub url: String,
    pub retry_count: u32,
}

impl FetchTask {
    pub fn new(partition: Partition, url: impl Into<String>) -> Self {
        Self {
            partition,
            url: url.into(),
            retry_count: 0,
        }
    }
}

/// Shift classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShiftType {
    #[serde(rename = "ON1")]
    Overnight1,
    #[serde(rename = "ON2")]
    Overnight2,
    #[serde(rename = "MidC")]
    MidCall,
    #[serde(rename = "MidL")]
    MidLate,
    #[serde(rename = "DAY")]
    Day,
}

impl ShiftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overnight1 => "ON1",
            Self::Overnight2 => "ON2",
            Self::MidCall => "MidC",
            Self::MidLate => "MidL",
            Self::Day => "DAY",
        }
    }

    /// Parse from a short code or a spelled-out label
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on1" | "overnight 1" | "overnight1" => Some(Self::Overnight1),
            "on2" | "overnight 2" | "overnight2" => Some(Self::Overnight2),
            "midc" | "mid call" | "mid-c" => Some(Self::MidCall),
            "midl" | "mid late" | "mid-l" => Some(Self::MidLate),
            "day" | "day shift" => Some(Self::Day),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::Overnight1,
            Self::Overnight2,
            Self::MidCall,
            Self::MidLate,
            Self::Day,
        ]
    }
}

impl std::fmt::Display for ShiftType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reading specialty of the assigned person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Specialty {
    #[serde(rename = "BODY_ONLY")]
    Body,
    #[serde(rename = "NEURO_ONLY")]
    Neuro,
    #[default]
    #[serde(rename = "BOTH")]
    Both,
}

impl Specialty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Body => "BODY_ONLY",
            Self::Neuro => "NEURO_ONLY",
            Self::Both => "BOTH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BODY_ONLY" | "BODY" => Some(Self::Body),
            "NEURO_ONLY" | "NEURO" => Some(Self::Neuro),
            "BOTH" | "" => Some(Self::Both),
            _ => None,
        }
    }

    /// Whether this person can read studies of `required`
    pub fn covers(&self, required: Specialty) -> bool {
        *self == Specialty::Both || *self == required
    }
}

impl std::fmt::Display for Specialty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row extracted from a scraped schedule page, before any mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawShift {
    pub date: NaiveDate,
    pub shift_type: String,
    pub person: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub required_staffing: Option<u32>,
    /// 1-based row index in the source table
    pub row: usize,
}

impl RawShift {
    /// Business identifier used for cross-partition deduplication
    pub fn natural_key(&self) -> String {
        format!("{}|{}", self.date, self.shift_type)
    }
}

/// Where an assignment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Spreadsheet,
    External,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spreadsheet => "spreadsheet",
            Self::External => "external",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spreadsheet" => Some(Self::Spreadsheet),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

/// One person assigned to one shift in a scheduling period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub period_id: Uuid,
    pub date: NaiveDate,
    pub shift_type: ShiftType,
    pub person: String,
    pub specialty: Specialty,
    pub source: RecordSource,
}

/// Effective classification of one assignment after reassignment rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageDecision {
    pub period_id: Uuid,
    pub date: NaiveDate,
    pub person: String,
    pub original_type: ShiftType,
    pub effective_type: ShiftType,
    /// Description of the rule that fired, if any
    pub reason: Option<String>,
}

impl CoverageDecision {
    pub fn is_reassigned(&self) -> bool {
        self.original_type != self.effective_type
    }
}

/// Schedule snapshot created by a successful spreadsheet import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleArtifact {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub created_by: Uuid,
    pub period_id: Uuid,
    pub start_month: Partition,
    pub month_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ScheduleArtifact {
    pub fn new(hospital_id: Uuid, created_by: Uuid, start_month: Partition, month_count: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            hospital_id,
            created_by,
            period_id: Uuid::new_v4(),
            start_month,
            month_count,
            created_at: Utc::now(),
        }
    }

    /// Months covered by this artifact
    pub fn months(&self) -> Vec<Partition> {
        Partition::range(self.start_month, self.month_count)
    }
}
