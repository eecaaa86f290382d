//! Core traits for export operations.
//!
//! Defines the [`ExportSink`] trait that format adapters implement.

use crate::Result;
use crate::models::Record;
use serde::Serialize;

/// Sink for exported records.
///
/// # Lifecycle
///
/// 1. Create the sink for a schema and an output destination
/// 2. Call `write()` for each record, in order
/// 3. Call `finalize()` to write any pending header and flush
///
/// Sinks never buffer more than the underlying writer does.
pub trait ExportSink {
    /// Writes a single record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the record does not match the
    /// schema, or [`crate::Error::OperationFailed`] if writing fails.
    fn write(&mut self, record: &Record) -> Result<()>;

    /// Number of records written so far.
    fn written(&self) -> u64;

    /// Finalizes the export, writing headers if none were written yet and
    /// flushing buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if I/O fails.
    fn finalize(self: Box<Self>) -> Result<ExportSummary>;
}

/// Result of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Records written.
    pub records: u64,
}
