//! CSV ingestion and export.
//!
//! # Architecture
//!
//! Ingestion runs four stages over a single pass of the input:
//!
//! - [`parser`] splits bytes into raw records, reporting structural damage
//! - [`codec`] decodes each field into a typed [`crate::Value`]
//! - [`validation`] checks nullability, unknown columns and cross-field rules
//! - [`services`] drives the stages and accumulates an [`crate::IngestionReport`]
//!
//! Export reverses the codec and writes through an [`ExportSink`].
//!
//! # Supported Formats
//!
//! | Format | Ingest | Export | Notes |
//! |--------|--------|--------|-------|
//! | CSV | ✓ | ✓ | Configurable delimiter, quote and escape |
//! | JSON | - | ✓ | Newline-delimited (NDJSON) |
//!
//! # Examples
//!
//! ```rust
//! use csvgate::io::{ExportOptions, export_records};
//! use csvgate::{ColumnDef, ColumnType, IngestionPipeline, Schema};
//!
//! let schema = Schema::new(vec![ColumnDef::new("qty", ColumnType::Integer)])?;
//! let report = IngestionPipeline::default()
//!     .ingest("qty\n4\n2\n".as_bytes(), &schema)?;
//!
//! let mut out = Vec::new();
//! export_records(&mut out, &report.records, &schema, &ExportOptions::default())?;
//! assert_eq!(String::from_utf8(out).unwrap(), "qty\n4\n2\n");
//! # Ok::<(), csvgate::Error>(())
//! ```

pub mod codec;
pub mod formats;
pub mod parser;
pub mod services;
pub mod traits;
pub mod validation;

// Re-exports for convenience
pub use codec::{ColumnMapping, FieldCodec};
pub use formats::Format;
pub use formats::csv::{export_csv, quote_field};
pub use parser::{HeaderRecord, ParsedRecord, StreamingParser};
pub use services::export::{ExportOptions, ExportResult, ExportService, export_records};
pub use services::ingest::{
    CancellationToken, IngestFailure, IngestResult, IngestService, IngestionPipeline,
};
pub use traits::{ExportSink, ExportSummary};
pub use validation::{RowOutcome, RowValidator};
