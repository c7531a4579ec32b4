//! Validation results shared by every import phase
//!
//! A [`ValidationResult`] is an ordered list of [`Message`]s in three tiers
//! (error, warning, info) plus a free-form context map. Phases produce their
//! own result; the orchestrator merges them, tagging each message with the
//! phase it came from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Machine-readable message codes
pub mod codes {
    pub const MISSING_HOSPITAL_ID: &str = "MISSING_HOSPITAL_ID";
    pub const MISSING_USER_ID: &str = "MISSING_USER_ID";
    pub const EMPTY_SPREADSHEET: &str = "EMPTY_SPREADSHEET";
    pub const MISSING_COLUMN: &str = "MISSING_COLUMN";
    pub const INVALID_DATE: &str = "INVALID_DATE";
    pub const UNKNOWN_SHIFT_TYPE: &str = "UNKNOWN_SHIFT_TYPE";
    pub const UNKNOWN_SPECIALTY: &str = "UNKNOWN_SPECIALTY";
    pub const MISSING_PERSON: &str = "MISSING_PERSON";
    pub const DUPLICATE_ROW: &str = "DUPLICATE_ROW";
    pub const ROWS_IMPORTED: &str = "ROWS_IMPORTED";
    pub const SPREADSHEET_IMPORT_FAILED: &str = "SPREADSHEET_IMPORT_FAILED";
    pub const EXTERNAL_IMPORT_FAILED: &str = "EXTERNAL_IMPORT_FAILED";
    pub const PARTITION_FETCH_FAILED: &str = "PARTITION_FETCH_FAILED";
    pub const DUPLICATE_RECORDS: &str = "DUPLICATE_RECORDS";
    pub const EXTRACTION_WARNING: &str = "EXTRACTION_WARNING";
    pub const UNMAPPED_EXTERNAL_SHIFT: &str = "UNMAPPED_EXTERNAL_SHIFT";
    pub const EXTERNAL_RECORDS_IMPORTED: &str = "EXTERNAL_RECORDS_IMPORTED";
    pub const COVERAGE_RESOLUTION_FAILED: &str = "COVERAGE_RESOLUTION_FAILED";
    pub const COVERAGE_GAP: &str = "COVERAGE_GAP";
    pub const UNDERSTAFFED: &str = "UNDERSTAFFED";
    pub const REASSIGNMENT_APPLIED: &str = "REASSIGNMENT_APPLIED";

    /// Every code this crate emits
    pub const ALL: &[&str] = &[
        MISSING_HOSPITAL_ID,
        MISSING_USER_ID,
        EMPTY_SPREADSHEET,
        MISSING_COLUMN,
        INVALID_DATE,
        UNKNOWN_SHIFT_TYPE,
        UNKNOWN_SPECIALTY,
        MISSING_PERSON,
        DUPLICATE_ROW,
        ROWS_IMPORTED,
        SPREADSHEET_IMPORT_FAILED,
        EXTERNAL_IMPORT_FAILED,
        PARTITION_FETCH_FAILED,
        DUPLICATE_RECORDS,
        EXTRACTION_WARNING,
        UNMAPPED_EXTERNAL_SHIFT,
        EXTERNAL_RECORDS_IMPORTED,
        COVERAGE_RESOLUTION_FAILED,
        COVERAGE_GAP,
        UNDERSTAFFED,
        REASSIGNMENT_APPLIED,
    ];
}

/// Pipeline stage a message originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Argument checks before any phase runs
    Input,
    SpreadsheetImport,
    ExternalImport,
    CoverageResolution,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::SpreadsheetImport => "spreadsheet_import",
            Self::ExternalImport => "external_import",
            Self::CoverageResolution => "coverage_resolution",
        }
    }

    /// Whether a failure here aborts the whole run
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Input | Self::SpreadsheetImport)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub severity: Severity,
    pub code: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Field-level detail, e.g. row and column of a spreadsheet problem
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Some(phase) => write!(f, "[{}] {phase} {}: {}", self.severity, self.code, self.text),
            None => write!(f, "[{}] {}: {}", self.severity, self.code, self.text),
        }
    }
}

/// Build a context map from key/value pairs
pub fn context<I, K, V>(pairs: I) -> BTreeMap<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Ordered set of validation messages plus run-level context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        severity: Severity,
        code: impl Into<String>,
        text: impl Into<String>,
        context: BTreeMap<String, Value>,
    ) {
        self.messages.push(Message {
            severity,
            code: code.into(),
            text: text.into(),
            phase: None,
            context,
        });
    }

    pub fn add_error(&mut self, code: impl Into<String>, text: impl Into<String>) {
        self.add(Severity::Error, code, text, BTreeMap::new());
    }

    pub fn add_warning(&mut self, code: impl Into<String>, text: impl Into<String>) {
        self.add(Severity::Warning, code, text, BTreeMap::new());
    }

    pub fn add_info(&mut self, code: impl Into<String>, text: impl Into<String>) {
        self.add(Severity::Info, code, text, BTreeMap::new());
    }

    pub fn add_error_with_context(
        &mut self,
        code: impl Into<String>,
        text: impl Into<String>,
        context: BTreeMap<String, Value>,
    ) {
        self.add(Severity::Error, code, text, context);
    }

    pub fn add_warning_with_context(
        &mut self,
        code: impl Into<String>,
        text: impl Into<String>,
        context: BTreeMap<String, Value>,
    ) {
        self.add(Severity::Warning, code, text, context);
    }

    pub fn add_info_with_context(
        &mut self,
        code: impl Into<String>,
        text: impl Into<String>,
        context: BTreeMap<String, Value>,
    ) {
        self.add(Severity::Info, code, text, context);
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn get_context(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Fold `other` into this result.
    ///
    /// Messages without a phase are tagged with `phase`; context keys are
    /// namespaced as `<phase>.<key>`.
    pub fn merge_from(&mut self, phase: Phase, other: ValidationResult) {
        for mut message in other.messages {
            message.phase.get_or_insert(phase);
            self.messages.push(message);
        }
        for (key, value) in other.context {
            self.context.insert(format!("{phase}.{key}"), value);
        }
    }

    /// Tag every untagged message with `phase`
    pub fn tag(&mut self, phase: Phase) {
        for message in &mut self.messages {
            message.phase.get_or_insert(phase);
        }
    }

    fn count(&self, severity: Severity) -> usize {
        self.messages
            .iter()
            .filter(|m| m.severity == severity)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn info_count(&self) -> usize {
        self.count(Severity::Info)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    /// No errors recorded
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// Errors block import; warnings do not
    pub fn can_import(&self) -> bool {
        self.is_valid()
    }

    /// Clean enough to promote to the live schedule: no errors or warnings
    pub fn can_promote(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }

    pub fn messages_by_code(&self, code: &str) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.code == code).collect()
    }

    pub fn messages_by_severity(&self, severity: Severity) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.severity == severity)
            .collect()
    }

    pub fn messages_for_phase(&self, phase: Phase) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.phase == Some(phase))
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} errors, {} warnings, {} info",
            self.error_count(),
            self.warning_count(),
            self.info_count()
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
