//! Validation errors and ingestion reports.

use super::row::Record;
use serde::Serialize;
use std::fmt;

/// Broad class of a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed row shape or quoting, detected before typing.
    Structural,
    /// Type, format or nullability failure of a single field.
    Field,
    /// Row-level semantic check (rules, unknown columns).
    Row,
}

/// Reason code of a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// A quoted field was still open at end of input.
    UnterminatedQuote,
    /// Unexpected characters after a closing quote.
    MalformedQuote,
    /// Field count differs from the header (or schema, headerless).
    FieldCountMismatch,
    /// A record exceeded the configured byte limit.
    RecordTooLarge,
    /// A record contained invalid UTF-8.
    InvalidEncoding,
    /// The header lacks a schema column.
    MissingColumn,
    /// Text could not be decoded as the declared type.
    TypeMismatch,
    /// Text did not match the declared format.
    FormatMismatch,
    /// A non-nullable column was empty.
    NullNotAllowed,
    /// The input carries a column the schema does not declare.
    UnknownColumn,
    /// A cross-field rule was violated.
    RuleViolation,
}

impl ErrorKind {
    /// Returns the wire name, e.g. `NULL_NOT_ALLOWED`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnterminatedQuote => "UNTERMINATED_QUOTE",
            Self::MalformedQuote => "MALFORMED_QUOTE",
            Self::FieldCountMismatch => "FIELD_COUNT_MISMATCH",
            Self::RecordTooLarge => "RECORD_TOO_LARGE",
            Self::InvalidEncoding => "INVALID_ENCODING",
            Self::MissingColumn => "MISSING_COLUMN",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::FormatMismatch => "FORMAT_MISMATCH",
            Self::NullNotAllowed => "NULL_NOT_ALLOWED",
            Self::UnknownColumn => "UNKNOWN_COLUMN",
            Self::RuleViolation => "RULE_VIOLATION",
        }
    }

    /// Returns the category of this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnterminatedQuote
            | Self::MalformedQuote
            | Self::FieldCountMismatch
            | Self::RecordTooLarge
            | Self::InvalidEncoding
            | Self::MissingColumn => ErrorCategory::Structural,
            Self::TypeMismatch | Self::FormatMismatch | Self::NullNotAllowed => {
                ErrorCategory::Field
            },
            Self::UnknownColumn | Self::RuleViolation => ErrorCategory::Row,
        }
    }

    /// Default severity of this kind.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::UnknownColumn => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Noted; the row is still accepted.
    Warning,
    /// The row is rejected.
    Error,
}

/// A row- or field-scoped problem found during ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// 1-based data row ordinal (0 for the header).
    pub row: u64,
    /// 1-based physical line where the record started.
    pub line: u64,
    /// Column name; absent for structural errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Reason code.
    pub kind: ErrorKind,
    /// Error or warning.
    pub severity: Severity,
    /// Human-readable detail.
    pub detail: String,
}

impl ValidationError {
    /// Creates a row-scoped structural error.
    #[must_use]
    pub fn structural(row: u64, line: u64, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            row,
            line,
            column: None,
            kind,
            severity: kind.severity(),
            detail: detail.into(),
        }
    }

    /// Creates a column-scoped error with the kind's default severity.
    #[must_use]
    pub fn for_column(
        row: u64,
        line: u64,
        column: impl Into<String>,
        kind: ErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            row,
            line,
            column: Some(column.into()),
            kind,
            severity: kind.severity(),
            detail: detail.into(),
        }
    }

    /// Whether this entry rejects its row.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} (line {})", self.row, self.line)?;
        if let Some(column) = &self.column {
            write!(f, ", column '{column}'")?;
        }
        write!(f, ": {}: {}", self.kind, self.detail)
    }
}

/// Lifecycle state of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Constructed, nothing read yet.
    Init,
    /// Reading and processing rows.
    Streaming,
    /// Input exhausted normally.
    Finalized,
    /// Stopped early; the report is incomplete.
    Aborted,
}

impl PipelineState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Streaming)
                | (Self::Streaming, Self::Streaming | Self::Finalized | Self::Aborted)
        )
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Streaming => "STREAMING",
            Self::Finalized => "FINALIZED",
            Self::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run ended in [`PipelineState::Aborted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbortReason {
    /// The error threshold was exceeded.
    TooManyErrors,
    /// The caller cancelled the run.
    Cancelled,
    /// The header lacks required columns.
    MissingColumns,
    /// The header record itself could not be parsed.
    InvalidHeader,
    /// The input stream failed.
    IoFailure,
}

impl AbortReason {
    /// Returns the reason name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TooManyErrors => "TOO_MANY_ERRORS",
            Self::Cancelled => "CANCELLED",
            Self::MissingColumns => "MISSING_COLUMNS",
            Self::InvalidHeader => "INVALID_HEADER",
            Self::IoFailure => "IO_FAILURE",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one ingestion run.
///
/// Every parsed data row is counted exactly once as accepted or rejected.
/// Only rows are counted; the header is not.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    /// Terminal state.
    pub state: PipelineState,
    /// Why the run aborted, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    /// Data rows read from the input.
    pub total_rows: u64,
    /// Rows accepted.
    pub accepted_count: u64,
    /// Rows rejected.
    pub rejected_count: u64,
    /// Header names, if the input had a header.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    /// Errors and warnings in input order.
    pub errors: Vec<ValidationError>,
    /// Accepted records retained under the configured retention policy.
    pub records: Vec<Record>,
    /// Whether `records` holds fewer entries than `accepted_count`.
    pub records_truncated: bool,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl IngestionReport {
    /// Whether the run processed the whole input.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.state, PipelineState::Finalized)
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.abort_reason == Some(AbortReason::Cancelled)
    }

    /// Number of error-severity entries.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_error()).count()
    }

    /// Number of warning-severity entries.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.errors.iter().filter(|e| !e.is_error()).count()
    }

    /// Whether any row was rejected.
    #[must_use]
    pub const fn has_errors(&self) -> bool {
        self.rejected_count > 0
    }

    /// Whether accepted + rejected equals the rows read.
    #[must_use]
    pub const fn is_accounted(&self) -> bool {
        self.accepted_count + self.rejected_count == self.total_rows
    }

    /// Errors and warnings reported for one data row.
    pub fn errors_for_row(&self, row: u64) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.row == row)
    }

    /// Entries of one kind.
    pub fn errors_of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}
