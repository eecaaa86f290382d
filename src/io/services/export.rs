//! Record export service.
//!
//! Loads records from a [`RecordStore`] and writes them in a chosen format.

use crate::config::ExportConfig;
use crate::io::formats::{Format, create_export_sink};
use crate::io::traits::ExportSink;
use crate::models::{Record, Schema};
use crate::observability::record_export;
use crate::storage::{RecordQuery, RecordStore};
use crate::{Error, Result};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// Options for record export.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// File format to export to; unset means inferred from the output path,
    /// falling back to CSV.
    pub format: Option<Format>,
    /// CSV dialect and header settings.
    pub config: ExportConfig,
    /// Window of stored records to export.
    pub query: RecordQuery,
}

impl ExportOptions {
    /// Sets the format explicitly.
    #[must_use]
    pub const fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// The format written when no output path is involved.
    #[must_use]
    pub fn effective_format(&self) -> Format {
        self.format.unwrap_or_default()
    }

    /// Sets the CSV settings.
    #[must_use]
    pub fn with_config(mut self, config: ExportConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the record window.
    #[must_use]
    pub const fn with_query(mut self, query: RecordQuery) -> Self {
        self.query = query;
        self
    }
}

/// Result of an export operation.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    /// Number of records exported.
    pub exported: u64,
    /// Format used for export.
    pub format: &'static str,
    /// Output path (if file export).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl ExportResult {
    /// Returns whether any records were exported.
    #[must_use]
    pub const fn has_exports(&self) -> bool {
        self.exported > 0
    }
}

/// Service for exporting stored records.
pub struct ExportService {
    store: Arc<dyn RecordStore>,
}

impl ExportService {
    /// Creates a new export service.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Exports stored records to a file.
    ///
    /// Without an explicit format, the format is inferred from the file
    /// extension, falling back to CSV.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn export_to_file(
        &self,
        path: &Path,
        schema: &Schema,
        options: ExportOptions,
    ) -> Result<ExportResult> {
        let format = options
            .format
            .or_else(|| Format::from_path(path).ok())
            .unwrap_or_default();

        let file = std::fs::File::create(path).map_err(|e| Error::io("create_export_file", &e))?;
        let mut result =
            self.export_to_writer(BufWriter::new(file), schema, &options.with_format(format))?;
        result.output_path = Some(path.display().to_string());
        Ok(result)
    }

    /// Exports stored records to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, encoding or writing fails.
    #[instrument(skip(self, writer, schema, options), fields(format = %options.effective_format()))]
    pub fn export_to_writer<W: Write>(
        &self,
        writer: W,
        schema: &Schema,
        options: &ExportOptions,
    ) -> Result<ExportResult> {
        let records = self.store.load(&options.query)?;
        export_records(writer, &records, schema, options)
    }
}

/// Writes `records` in the format named by `options`.
///
/// # Errors
///
/// Returns an error if a record does not match the schema or writing fails.
pub fn export_records<'r, W, I>(
    writer: W,
    records: I,
    schema: &Schema,
    options: &ExportOptions,
) -> Result<ExportResult>
where
    W: Write,
    I: IntoIterator<Item = &'r Record>,
{
    let format = options.effective_format();
    let mut sink = create_export_sink(writer, format, schema, &options.config)?;
    write_all(sink.as_mut(), records)?;
    let summary = sink.finalize()?;
    record_export(format.as_str(), summary.records);
    info!(
        format = %format,
        records = summary.records,
        "Export finished"
    );
    Ok(ExportResult {
        exported: summary.records,
        format: format.as_str(),
        output_path: None,
    })
}

fn write_all<'r, I>(sink: &mut dyn ExportSink, records: I) -> Result<()>
where
    I: IntoIterator<Item = &'r Record>,
{
    for record in records {
        sink.write(record)?;
    }
    Ok(())
}
