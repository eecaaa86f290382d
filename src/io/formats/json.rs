//! Newline-delimited JSON export.
//!
//! Each record becomes one JSON object keyed by column name, in schema
//! order. Values use their natural JSON form; decimals are strings to keep
//! their scale and dates are ISO-8601.

use crate::io::codec::FieldCodec;
use crate::io::traits::{ExportSink, ExportSummary};
use crate::models::{Record, Schema};
use crate::{Error, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::{BufWriter, Write};

/// A record paired with its schema for serialization.
pub struct RecordView<'a> {
    schema: &'a Schema,
    record: &'a Record,
}

impl<'a> RecordView<'a> {
    /// Pairs a record with the schema naming its values.
    #[must_use]
    pub const fn new(schema: &'a Schema, record: &'a Record) -> Self {
        Self { schema, record }
    }
}

impl Serialize for RecordView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schema.len()))?;
        for (name, value) in self.schema.column_names().zip(&self.record.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// NDJSON export sink.
pub struct JsonExportSink<'a, W: Write> {
    writer: BufWriter<W>,
    codec: FieldCodec<'a>,
    written: u64,
}

impl<'a, W: Write> JsonExportSink<'a, W> {
    /// Creates a new NDJSON export sink.
    #[must_use]
    pub fn new(writer: W, schema: &'a Schema) -> Self {
        Self {
            writer: BufWriter::new(writer),
            codec: FieldCodec::new(schema, ""),
            written: 0,
        }
    }
}

impl<W: Write> ExportSink for JsonExportSink<'_, W> {
    fn write(&mut self, record: &Record) -> Result<()> {
        self.codec.check_record(record)?;
        serde_json::to_writer(
            &mut self.writer,
            &RecordView::new(self.codec.schema(), record),
        )
        .map_err(|e| Error::OperationFailed {
            operation: "write_json".to_string(),
            cause: e.to_string(),
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| Error::io("write_json", &e))?;
        self.written += 1;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }

    fn finalize(mut self: Box<Self>) -> Result<ExportSummary> {
        self.writer
            .flush()
            .map_err(|e| Error::io("flush_json", &e))?;
        Ok(ExportSummary {
            records: self.written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDef, ColumnType, Value};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_ndjson_keeps_schema_order() {
        let schema = Schema::new(vec![
            ColumnDef::new("zeta", ColumnType::Integer),
            ColumnDef::new("alpha", ColumnType::Decimal),
            ColumnDef::new("flag", ColumnType::Boolean),
        ])
        .unwrap();
        let mut out = Vec::new();
        {
            let mut sink = Box::new(JsonExportSink::new(&mut out, &schema));
            sink.write(&Record::new(vec![
                Value::Integer(1),
                Value::Decimal(Decimal::from_str("2.50").unwrap()),
                Value::Null,
            ]))
            .unwrap();
            let summary = sink.finalize().unwrap();
            assert_eq!(summary.records, 1);
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "{\"zeta\":1,\"alpha\":\"2.50\",\"flag\":null}\n");
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let schema = Schema::new(vec![ColumnDef::new("a", ColumnType::Text)]).unwrap();
        let mut sink = JsonExportSink::new(Vec::new(), &schema);
        assert!(sink.write(&Record::new(Vec::new())).is_err());
    }
}
