//! Preflight validation
//!
//! Checks payloads against cached metadata before anything is sent to the
//! remote service. Fatal issues block submission; warnings and suggestions
//! ride along without affecting validity.

pub mod preflight;

pub use preflight::{PreflightValidator, render_summary};

use serde::{Deserialize, Serialize};

/// Machine-readable issue taxonomy. The first group blocks submission, the
/// second is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    // fatal
    MetadataNotFound,
    CrudPermission,
    RequiredField,
    TypeMismatch,
    LengthExceeded,
    InvalidPicklistValue,
    RequiredRelationship,
    // advisory
    UnknownField,
    PrecisionWarning,
    ScaleWarning,
    ValidationRulesExist,
    ReferenceCheck,
    DuplicateSuspect,
}

/// One finding: kind, offending field where applicable, human message and an
/// optional remediation hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.map(str::to_string),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Aggregated outcome of one validate call. `valid` tracks errors only;
/// warnings and suggestions never flip it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub suggestions: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    pub fn add_warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    pub fn add_suggestion(&mut self, issue: ValidationIssue) {
        self.suggestions.push(issue);
    }

    /// Errors for a specific field, for tests and targeted reporting.
    pub fn errors_for(&self, field: &str) -> Vec<&ValidationIssue> {
        self.errors
            .iter()
            .filter(|i| i.field.as_deref() == Some(field))
            .collect()
    }
}
