//! Ingestion and export service implementations.
//!
//! Orchestrates parsing, validation, storage and format writing.

pub mod export;
pub mod ingest;

pub use export::{ExportOptions, ExportResult, ExportService, export_records};
pub use ingest::{CancellationToken, IngestFailure, IngestResult, IngestService, IngestionPipeline};
