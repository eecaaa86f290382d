//! Property-based tests for the CSV pipeline.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Exported records ingest back to the same values
//! - Every data row is counted exactly once
//! - A quoted field parses back to its text
//! - Parallel decoding matches sequential decoding

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use csvgate::io::{ParsedRecord, StreamingParser, export_csv, quote_field};
use csvgate::{
    ColumnDef, ColumnType, CsvDialect, Escape, ExportConfig, IngestConfig, IngestionPipeline,
    IngestionReport, Record, Schema, Value,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn ledger() -> Schema {
    Schema::new(vec![
        ColumnDef::new("id", ColumnType::Integer).required(),
        ColumnDef::new("note", ColumnType::Text),
        ColumnDef::new("amount", ColumnType::Decimal),
        ColumnDef::new("active", ColumnType::Boolean),
    ])
    .unwrap()
}

fn people() -> Schema {
    Schema::new(vec![
        ColumnDef::new("id", ColumnType::Integer).required(),
        ColumnDef::new("name", ColumnType::Text),
    ])
    .unwrap()
}

fn ingest(input: &str, schema: &Schema, config: IngestConfig) -> IngestionReport {
    IngestionPipeline::new(config)
        .ingest(input.as_bytes(), schema)
        .unwrap()
}

fn dialect_strategy() -> impl Strategy<Value = CsvDialect> {
    prop_oneof![
        Just(CsvDialect::default()),
        Just(CsvDialect::default().with_escape(Escape::Backslash)),
        Just(CsvDialect::tsv()),
        Just(CsvDialect::default().with_delimiter(b';').with_null_value("NULL")),
        Just(CsvDialect::default().with_quote(b'\'')),
    ]
}

fn text_strategy() -> impl Strategy<Value = String> {
    r#"[a-zA-Z0-9 ,;|\t"'\\\n\ré]{0,16}"#
}

fn record_strategy() -> impl Strategy<Value = Record> {
    (
        any::<i64>(),
        proptest::option::of(text_strategy()),
        proptest::option::of((any::<i64>(), 0u32..8)),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(id, note, amount, active)| {
            Record::new(vec![
                Value::Integer(id),
                note.map_or(Value::Null, Value::Text),
                amount.map_or(Value::Null, |(mantissa, scale)| {
                    Value::Decimal(Decimal::new(mantissa, scale))
                }),
                active.map_or(Value::Null, Value::Boolean),
            ])
        })
}

proptest! {
    /// Property: export then ingest yields the exported values.
    #[test]
    fn prop_export_round_trip(
        records in proptest::collection::vec(record_strategy(), 0..20),
        dialect in dialect_strategy(),
    ) {
        let schema = ledger();
        let mut out = Vec::new();
        export_csv(&mut out, &records, &schema, &ExportConfig::from(&dialect)).unwrap();
        let text = String::from_utf8(out).unwrap();

        let report = ingest(&text, &schema, IngestConfig::default().with_dialect(dialect));
        prop_assert!(report.is_complete());
        prop_assert!(report.errors.is_empty(), "{:?}\n{}", report.errors, text);
        prop_assert_eq!(report.total_rows, records.len() as u64);

        let values: Vec<_> = report.records.into_iter().map(|r| r.values).collect();
        let expected: Vec<_> = records.into_iter().map(|r| r.values).collect();
        prop_assert_eq!(values, expected);
    }

    /// Property: accepted plus rejected equals rows read.
    #[test]
    fn prop_rows_are_accounted(lines in proptest::collection::vec("[a-z0-9,\" ]{0,12}", 0..30)) {
        let input = format!("id,name\n{}", lines.join("\n"));
        let report = ingest(&input, &people(), IngestConfig::default());

        prop_assert!(report.is_complete());
        prop_assert!(report.is_accounted());
        prop_assert_eq!(report.records.len() as u64, report.accepted_count);
        for error in &report.errors {
            prop_assert!(error.row >= 1 && error.row <= report.total_rows);
        }
    }

    /// Property: a field written by `quote_field` reads back as one field.
    #[test]
    fn prop_quote_field_parses_back(text in text_strategy(), dialect in dialect_strategy()) {
        let config = ExportConfig::from(&dialect);
        let line = format!("{}\n", quote_field(&text, &config));

        let dialect = config.reading_dialect().with_header(false);
        let mut parser = StreamingParser::new(line.as_bytes(), dialect);
        match parser.next_record().unwrap() {
            Some(ParsedRecord::Row(raw)) => {
                prop_assert_eq!(raw.len(), 1);
                prop_assert_eq!(raw.fields()[0].text(), text.as_str());
            },
            other => prop_assert!(false, "unexpected {:?} for {:?}", other, line),
        }
        prop_assert!(parser.next_record().unwrap().is_none());
    }

    /// Property: parallel decoding matches sequential decoding.
    #[test]
    fn prop_parallel_matches_sequential(
        lines in proptest::collection::vec("[0-9]{1,3},[a-z]{0,4}|x,y|[0-9]{1,2}", 0..60),
        workers in 2usize..5,
        batch_size in 1usize..16,
    ) {
        let input = format!("id,name\n{}\n", lines.join("\n"));
        let sequential = ingest(&input, &people(), IngestConfig::default());
        let parallel = ingest(
            &input,
            &people(),
            IngestConfig::default().with_workers(workers).with_batch_size(batch_size),
        );

        prop_assert_eq!(parallel.state, sequential.state);
        prop_assert_eq!(parallel.total_rows, sequential.total_rows);
        prop_assert_eq!(parallel.accepted_count, sequential.accepted_count);
        prop_assert_eq!(parallel.records, sequential.records);
        prop_assert_eq!(parallel.errors, sequential.errors);
    }

    /// Property: an error threshold never lets more errors through than allowed plus one.
    #[test]
    fn prop_threshold_bounds_errors(
        lines in proptest::collection::vec("[0-9]{1,3},[a-z]{0,3}|x,y", 0..40),
        max_errors in 0usize..5,
    ) {
        let input = format!("id,name\n{}\n", lines.join("\n"));
        let config = IngestConfig::default().with_max_errors(max_errors);
        let report = ingest(&input, &people(), config);

        prop_assert!(report.error_count() <= max_errors + 1);
        prop_assert!(report.is_accounted());
        prop_assert!(report.total_rows <= lines.len() as u64);
    }
}
