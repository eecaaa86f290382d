//! # csvgate
//!
//! Streaming CSV ingestion and export with schema validation.
//!
//! csvgate turns untrusted delimited text into typed records and back. Input is
//! parsed incrementally, every field is decoded against a declared [`Schema`],
//! and every row ends up either accepted or described by one or more
//! [`ValidationError`]s in an [`IngestionReport`]. Row-level problems never stop
//! a run; only an error threshold, cancellation, or an I/O fault does.
//!
//! ## Features
//!
//! - Single-pass streaming parser with bounded memory per record
//! - Quoted fields with embedded delimiters, line breaks and escaped quotes
//! - Recovery from unterminated quotes without losing later rows
//! - Typed columns: text, integer, decimal, date, boolean
//! - Cross-field rules declared in the schema
//! - Round-trip compatible CSV export and NDJSON export
//!
//! ## Example
//!
//! ```rust
//! use csvgate::{ColumnDef, ColumnType, IngestConfig, IngestionPipeline, Schema};
//!
//! let schema = Schema::new(vec![
//!     ColumnDef::new("id", ColumnType::Integer).required(),
//!     ColumnDef::new("name", ColumnType::Text),
//! ])?;
//!
//! let input = "id,name\n1,Alice\n,Bob\n";
//! let report = IngestionPipeline::new(IngestConfig::default())
//!     .ingest(input.as_bytes(), &schema)
//!     .map_err(|failure| failure.error)?;
//!
//! assert_eq!(report.accepted_count, 1);
//! assert_eq!(report.rejected_count, 1);
//! # Ok::<(), csvgate::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod analytics;
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod storage;

// Re-exports for convenience
pub use config::{AppConfig, CsvDialect, Escape, ExportConfig, IngestConfig, RecordRetention};
pub use io::services::export::{ExportOptions, ExportService};
pub use io::services::ingest::{
    CancellationToken, IngestFailure, IngestResult, IngestService, IngestionPipeline,
};
pub use models::{
    AbortReason, ColumnDef, ColumnType, CompareOp, CrossFieldRule, ErrorCategory, ErrorKind,
    IngestionReport, PipelineState, RawRow, Record, Schema, Severity, TypedRow, ValidationError,
    Value,
};
pub use storage::{InMemoryRecordStore, RecordQuery, RecordStore, SaveOutcome};

/// Error type for csvgate operations.
///
/// Row- and field-scoped problems are never raised through this type; they are
/// collected into an [`IngestionReport`]. `Error` covers the failures that end
/// an operation.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Bad schema, bad dialect, record/schema mismatch on export |
/// | `OperationFailed` | I/O errors reading input or writing output, config parse failures |
/// | `NotFound` | Unknown symbol in price analytics |
/// | `NoData` | A known symbol has no entries in the requested window |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A schema has duplicate column names or an uncompilable format
    /// - A dialect uses non-ASCII or colliding delimiter/quote bytes
    /// - An exported record does not match the schema arity or types
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - The input stream cannot be read
    /// - The output sink cannot be written or flushed
    /// - A config or schema file cannot be read or parsed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity exists but has no data for the request.
    #[error("no data: {0}")]
    NoData(String),
}

impl Error {
    /// Wraps an I/O error as a failed operation.
    pub(crate) fn io(operation: &str, err: &std::io::Error) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: err.to_string(),
        }
    }
}

/// Result type alias for csvgate operations.
pub type Result<T> = std::result::Result<T, Error>;
