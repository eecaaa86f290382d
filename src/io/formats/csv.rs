//! CSV export.
//!
//! Fields are quoted and escaped here and handed to a `csv::Writer` in
//! [`csv::QuoteStyle::Never`] mode, so every field gets exactly the quoting
//! the streaming parser expects when reading it back:
//!
//! - null is an empty, unquoted field
//! - empty text is `""`
//! - text equal to the configured null spelling is quoted
//! - with backslash escaping, backslashes force quoting and are doubled

use crate::config::{Escape, ExportConfig};
use crate::io::codec::FieldCodec;
use crate::io::traits::{ExportSink, ExportSummary};
use crate::models::{Record, Schema};
use crate::{Error, Result};
use std::borrow::Cow;
use std::io::Write;

/// CSV export sink.
pub struct CsvExportSink<'a, W: Write> {
    writer: csv::Writer<W>,
    codec: FieldCodec<'a>,
    config: ExportConfig,
    headers_written: bool,
    written: u64,
}

impl<'a, W: Write> CsvExportSink<'a, W> {
    /// Creates a new CSV export sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the export dialect is invalid.
    pub fn new(writer: W, schema: &'a Schema, config: ExportConfig) -> Result<Self> {
        config.validate()?;
        let csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(config.delimiter)
            .quote_style(csv::QuoteStyle::Never)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);

        Ok(Self {
            writer: csv_writer,
            codec: FieldCodec::new(schema, ""),
            config,
            headers_written: false,
            written: 0,
        })
    }

    /// Writes headers if configured and not already written.
    fn ensure_headers(&mut self) -> Result<()> {
        if self.config.has_header && !self.headers_written {
            let config = &self.config;
            let names: Vec<Cow<'_, str>> = self
                .codec
                .schema()
                .column_names()
                .map(|name| quote_field(name, config))
                .collect();
            self.writer
                .write_record(names.iter().map(|n| n.as_bytes()))
                .map_err(|e| write_error("write_csv_headers", &e))?;
        }
        self.headers_written = true;
        Ok(())
    }
}

impl<W: Write> ExportSink for CsvExportSink<'_, W> {
    fn write(&mut self, record: &Record) -> Result<()> {
        self.codec.check_record(record)?;
        self.ensure_headers()?;

        let mut fields: Vec<Cow<'_, str>> = Vec::with_capacity(record.values.len());
        for (position, value) in record.values.iter().enumerate() {
            let field = match self.codec.encode(position, value)? {
                None => Cow::Borrowed(""),
                Some(Cow::Borrowed(text)) => quote_field(text, &self.config),
                Some(Cow::Owned(text)) => Cow::Owned(quote_field(&text, &self.config).into_owned()),
            };
            fields.push(field);
        }

        self.writer
            .write_record(fields.iter().map(|f| f.as_bytes()))
            .map_err(|e| write_error("write_csv", &e))?;
        self.written += 1;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }

    fn finalize(mut self: Box<Self>) -> Result<ExportSummary> {
        self.ensure_headers()?;
        self.writer
            .flush()
            .map_err(|e| Error::io("flush_csv", &e))?;
        Ok(ExportSummary {
            records: self.written,
        })
    }
}

/// Writes `records` as CSV to `writer`.
///
/// Output is streamed: only one record is encoded at a time.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for a record that does not fit the schema
/// (records before it are already written), or
/// [`Error::OperationFailed`] if the writer fails.
pub fn export_csv<'r, W, I>(
    writer: W,
    records: I,
    schema: &Schema,
    config: &ExportConfig,
) -> Result<ExportSummary>
where
    W: Write,
    I: IntoIterator<Item = &'r Record>,
{
    let mut sink = Box::new(CsvExportSink::new(writer, schema, config.clone())?);
    for record in records {
        sink.write(record)?;
    }
    sink.finalize()
}

/// Quotes and escapes one field for the export dialect, if needed.
#[must_use]
pub fn quote_field<'t>(text: &'t str, config: &ExportConfig) -> Cow<'t, str> {
    let backslash = config.escape == Escape::Backslash;
    let needs_quotes = text.is_empty()
        || (!config.null_value.is_empty() && text == config.null_value)
        || text.starts_with([' ', '\t'])
        || text.ends_with([' ', '\t'])
        || text.bytes().any(|b| {
            b == config.delimiter
                || b == config.quote
                || b == b'\n'
                || b == b'\r'
                || (backslash && b == b'\\')
        });
    if !needs_quotes {
        return Cow::Borrowed(text);
    }

    let quote = char::from(config.quote);
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        if c == quote {
            out.push(if backslash { '\\' } else { quote });
        } else if backslash && c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(quote);
    Cow::Owned(out)
}

fn write_error(operation: &str, e: &csv::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CsvDialect;
    use crate::models::{ColumnDef, ColumnType, Value};
    use chrono::NaiveDate;

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("id", ColumnType::Integer).required(),
            ColumnDef::new("name", ColumnType::Text),
            ColumnDef::new("joined", ColumnType::Date).with_format("dd.MM.yyyy"),
        ])
        .unwrap()
    }

    fn export(records: &[Record], config: &ExportConfig) -> String {
        let mut out = Vec::new();
        export_csv(&mut out, records, &schema(), config).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_export_with_header() {
        let records = vec![
            Record::new(vec![
                Value::Integer(1),
                Value::from("Alice"),
                Value::Date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
            ]),
            Record::new(vec![Value::Integer(2), Value::Null, Value::Null]),
        ];
        let out = export(&records, &ExportConfig::default());
        assert_eq!(out, "id,name,joined\n1,Alice,10.01.2024\n2,,\n");
    }

    #[test]
    fn test_empty_export_writes_only_header() {
        let out = export(&[], &ExportConfig::default());
        assert_eq!(out, "id,name,joined\n");
    }

    #[test]
    fn test_empty_export_without_header() {
        let out = export(&[], &ExportConfig::default().with_header(false));
        assert!(out.is_empty());
    }

    #[test]
    fn test_quoting_rules() {
        let config = ExportConfig::default();
        assert_eq!(quote_field("plain", &config), "plain");
        assert_eq!(quote_field("", &config), "\"\"");
        assert_eq!(quote_field("a,b", &config), "\"a,b\"");
        assert_eq!(quote_field("say \"hi\"", &config), "\"say \"\"hi\"\"\"");
        assert_eq!(quote_field("two\nlines", &config), "\"two\nlines\"");
        assert_eq!(quote_field(" padded", &config), "\" padded\"");
        assert_eq!(quote_field("c:\\tmp", &config), "c:\\tmp");
    }

    #[test]
    fn test_backslash_quoting() {
        let config = ExportConfig::from(&CsvDialect::default().with_escape(Escape::Backslash));
        assert_eq!(quote_field("say \"hi\"", &config), "\"say \\\"hi\\\"\"");
        assert_eq!(quote_field("c:\\tmp", &config), "\"c:\\\\tmp\"");
    }

    #[test]
    fn test_null_spelling_is_quoted() {
        let config = ExportConfig::from(&CsvDialect::default().with_null_value("NULL"));
        assert_eq!(quote_field("NULL", &config), "\"NULL\"");
        assert_eq!(quote_field("NULLS", &config), "NULLS");
    }

    #[test]
    fn test_custom_delimiter() {
        let records = vec![Record::new(vec![
            Value::Integer(1),
            Value::from("a;b"),
            Value::Null,
        ])];
        let config = ExportConfig::default().with_delimiter(b';');
        let out = export(&records, &config);
        assert_eq!(out, "id;name;joined\n1;\"a;b\";\n");
    }

    #[test]
    fn test_mismatched_record_is_rejected() {
        let mut out = Vec::new();
        let records = vec![Record::new(vec![Value::from("x"), Value::Null, Value::Null])];
        let result = export_csv(&mut out, &records, &schema(), &ExportConfig::default());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
