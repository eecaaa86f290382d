//! Format adapters for export.
//!
//! Each format implements the [`ExportSink`] trait.

pub mod csv;
pub mod json;

use crate::config::ExportConfig;
use crate::models::Schema;
use crate::{Error, Result};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use super::traits::ExportSink;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// Delimited text, round-trip compatible with the parser.
    #[default]
    Csv,
    /// Newline-delimited JSON objects.
    Json,
}

impl Format {
    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "ndjson",
        }
    }

    /// Returns the MIME type for this format.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/x-ndjson",
        }
    }

    /// Returns the metric label for this format.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// Detects format from file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not recognized.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match ext.as_deref() {
            Some("csv" | "tsv" | "txt") => Ok(Self::Csv),
            Some("json" | "ndjson" | "jsonl") => Ok(Self::Json),
            Some(ext) => Err(Error::InvalidInput(format!(
                "Unsupported file extension: .{ext}"
            ))),
            None => Err(Error::InvalidInput(
                "Cannot determine format: file has no extension".to_string(),
            )),
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" | "tsv" => Ok(Self::Csv),
            "json" | "ndjson" | "jsonl" => Ok(Self::Json),
            _ => Err(Error::InvalidInput(format!("Unknown format: {s}"))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creates an export sink for the given format and writer.
///
/// # Errors
///
/// Returns an error if the export dialect is invalid.
pub fn create_export_sink<'a, W: Write + 'a>(
    writer: W,
    format: Format,
    schema: &'a Schema,
    config: &ExportConfig,
) -> Result<Box<dyn ExportSink + 'a>> {
    match format {
        Format::Csv => Ok(Box::new(csv::CsvExportSink::new(
            writer,
            schema,
            config.clone(),
        )?)),
        Format::Json => Ok(Box::new(json::JsonExportSink::new(writer, schema))),
    }
}
