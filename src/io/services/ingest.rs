//! Ingestion pipeline.
//!
//! [`IngestionPipeline`] drives the streaming parser, field codec and row
//! validator over one input and accumulates an [`IngestionReport`].
//!
//! # State machine
//!
//! ```text
//! INIT -> STREAMING -> FINALIZED
//!              \-----> ABORTED   (threshold, cancellation, missing columns, I/O)
//! ```
//!
//! Row-level problems never stop a run. A run that stops early still yields
//! its report: as `Ok` with state `ABORTED` for threshold, cancellation and
//! header problems, or inside an [`IngestFailure`] when the reader fails.

use crate::config::{IngestConfig, RecordRetention};
use crate::io::codec::{ColumnMapping, FieldCodec};
use crate::io::parser::{HeaderRecord, ParsedRecord, StreamingParser};
use crate::io::validation::{RowOutcome, RowValidator};
use crate::models::{
    AbortReason, ErrorKind, IngestionReport, PipelineState, Schema, ValidationError,
};
use crate::observability::record_ingest;
use crate::storage::{RecordStore, SaveOutcome};
use crate::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Line reported for header-level errors.
const HEADER_LINE: u64 = 1;

/// Cooperative cancellation flag shared between a run and its caller.
///
/// Checked at every row boundary; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A run that ended on an I/O or configuration failure.
///
/// Carries the report accumulated up to the failure.
#[derive(Debug)]
pub struct IngestFailure {
    /// The failure.
    pub error: Error,
    /// Report of the rows processed before the failure.
    pub partial: Box<IngestionReport>,
}

impl IngestFailure {
    fn new(error: Error, partial: IngestionReport) -> Self {
        Self {
            error,
            partial: Box::new(partial),
        }
    }

    /// A failure that happened before any input was read.
    #[must_use]
    pub fn before_start(error: Error) -> Self {
        Self::new(error, ReportBuilder::new(RecordRetention::All).report)
    }
}

impl fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (after {} rows)",
            self.error, self.partial.total_rows
        )
    }
}

impl std::error::Error for IngestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<IngestFailure> for Error {
    fn from(failure: IngestFailure) -> Self {
        failure.error
    }
}

/// Accumulates the report and owns its state transitions.
struct ReportBuilder {
    report: IngestionReport,
    retention: RecordRetention,
    errors: usize,
    started: Instant,
}

impl ReportBuilder {
    fn new(retention: RecordRetention) -> Self {
        Self {
            report: IngestionReport {
                state: PipelineState::Init,
                abort_reason: None,
                total_rows: 0,
                accepted_count: 0,
                rejected_count: 0,
                headers: Vec::new(),
                errors: Vec::new(),
                records: Vec::new(),
                records_truncated: false,
                duration_ms: 0,
            },
            retention,
            errors: 0,
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        let current = self.report.state;
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "Ignoring illegal pipeline transition");
            return;
        }
        debug!(from = %current, to = %next, "Pipeline state transition");
        self.report.state = next;
    }

    fn record_issue(&mut self, issue: ValidationError) {
        if issue.is_error() {
            self.errors += 1;
        }
        self.report.errors.push(issue);
    }

    /// Accounts for one row. Returns `true` once the error threshold is exceeded.
    fn absorb(&mut self, outcome: RowOutcome, max_errors: Option<usize>) -> bool {
        self.report.total_rows += 1;
        for issue in outcome.issues {
            self.record_issue(issue);
        }
        match outcome.record {
            Some(record) => {
                self.report.accepted_count += 1;
                if self.retention.keeps(self.report.records.len()) {
                    self.report.records.push(record);
                }
            },
            None => self.report.rejected_count += 1,
        }
        max_errors.is_some_and(|max| self.errors > max)
    }

    fn abort(&mut self, reason: AbortReason) {
        self.transition(PipelineState::Aborted);
        self.report.abort_reason = Some(reason);
    }

    fn finish(mut self) -> IngestionReport {
        if self.report.state == PipelineState::Streaming {
            self.transition(PipelineState::Finalized);
        }
        let kept = u64::try_from(self.report.records.len()).unwrap_or(u64::MAX);
        self.report.records_truncated = kept < self.report.accepted_count;
        self.report.duration_ms =
            u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let report = self.report;
        match (report.state, report.abort_reason) {
            (PipelineState::Aborted, Some(reason)) => warn!(
                reason = %reason,
                total_rows = report.total_rows,
                accepted = report.accepted_count,
                rejected = report.rejected_count,
                "Ingestion aborted"
            ),
            (PipelineState::Finalized, _) => info!(
                total_rows = report.total_rows,
                accepted = report.accepted_count,
                rejected = report.rejected_count,
                warnings = report.warning_count(),
                duration_ms = report.duration_ms,
                "Ingestion finished"
            ),
            _ => {},
        }
        if report.state.is_terminal() {
            record_ingest(&report);
        }
        report
    }

    fn fail(mut self, err: Error) -> IngestFailure {
        if self.report.state == PipelineState::Streaming {
            self.abort(AbortReason::IoFailure);
        }
        error!(error = %err, rows = self.report.total_rows, "Ingestion failed");
        IngestFailure::new(err, self.finish())
    }
}

/// Decodes and validates parsed records for one run.
struct RowDecoder<'a> {
    codec: FieldCodec<'a>,
    validator: RowValidator<'a>,
    mapping: &'a ColumnMapping,
}

impl RowDecoder<'_> {
    fn process(&self, record: &ParsedRecord) -> RowOutcome {
        match record {
            ParsedRecord::Row(raw) => self
                .validator
                .validate(self.codec.decode_row(raw, self.mapping)),
            ParsedRecord::Malformed(issue) => RowOutcome {
                record: None,
                issues: vec![issue.clone()],
            },
        }
    }
}

/// Streams CSV input through parsing, decoding and validation.
///
/// Each call to [`ingest`](Self::ingest) is an independent run; a pipeline
/// holds no state between runs except its cancellation token.
#[derive(Debug, Clone, Default)]
pub struct IngestionPipeline {
    config: IngestConfig,
    cancel: CancellationToken,
}

impl IngestionPipeline {
    /// Creates a pipeline with the given settings.
    #[must_use]
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the settings.
    #[must_use]
    pub const fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Returns a handle that cancels runs of this pipeline.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ingests CSV from `reader` against `schema`.
    ///
    /// # Errors
    ///
    /// Returns an [`IngestFailure`] if the configuration is invalid or the
    /// reader fails. Row errors, threshold aborts and cancellation are not
    /// failures; they are described by the returned report.
    #[instrument(
        skip(self, reader, schema),
        fields(columns = schema.len(), workers = self.config.workers)
    )]
    pub fn ingest<R: BufRead>(
        &self,
        reader: R,
        schema: &Schema,
    ) -> std::result::Result<IngestionReport, IngestFailure> {
        let mut report = ReportBuilder::new(self.config.retention);
        if let Err(err) = self.config.validate() {
            return Err(report.fail(err));
        }
        report.transition(PipelineState::Streaming);
        match self.run(reader, schema, &mut report) {
            Ok(()) => Ok(report.finish()),
            Err(err) => Err(report.fail(err)),
        }
    }

    /// Ingests the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`IngestFailure`] if the file cannot be opened or read.
    pub fn ingest_path(
        &self,
        path: &Path,
        schema: &Schema,
    ) -> std::result::Result<IngestionReport, IngestFailure> {
        let file = File::open(path)
            .map_err(|e| IngestFailure::before_start(Error::io("open_input", &e)))?;
        self.ingest(BufReader::with_capacity(READ_BUFFER_BYTES, file), schema)
    }

    fn run<R: BufRead>(
        &self,
        reader: R,
        schema: &Schema,
        report: &mut ReportBuilder,
    ) -> Result<()> {
        let dialect = &self.config.dialect;
        let mut parser = StreamingParser::new(reader, dialect.clone());
        if !dialect.has_header {
            parser = parser.with_expected_fields(schema.len());
        }

        let mapping = match parser.read_header()? {
            HeaderRecord::Absent => ColumnMapping::positional(schema),
            HeaderRecord::Names(names) => {
                let mapping = ColumnMapping::from_header(schema, &names);
                report.report.headers = names;
                let mut missing = false;
                for column in mapping.missing(schema).filter(|c| !c.nullable) {
                    report.record_issue(ValidationError::for_column(
                        0,
                        HEADER_LINE,
                        &column.name,
                        ErrorKind::MissingColumn,
                        "required column is absent from the header",
                    ));
                    missing = true;
                }
                if missing {
                    report.abort(AbortReason::MissingColumns);
                    return Ok(());
                }
                mapping
            },
            HeaderRecord::Malformed(issue) => {
                report.record_issue(issue);
                report.abort(AbortReason::InvalidHeader);
                return Ok(());
            },
        };

        let decoder = RowDecoder {
            codec: FieldCodec::new(schema, &dialect.null_value),
            validator: RowValidator::new(schema),
            mapping: &mapping,
        };
        if self.config.workers > 1 {
            self.run_parallel(&mut parser, &decoder, report)
        } else {
            self.run_sequential(&mut parser, &decoder, report)
        }
    }

    fn run_sequential<R: BufRead>(
        &self,
        parser: &mut StreamingParser<R>,
        decoder: &RowDecoder<'_>,
        report: &mut ReportBuilder,
    ) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                report.abort(AbortReason::Cancelled);
                return Ok(());
            }
            let Some(record) = parser.next_record()? else {
                return Ok(());
            };
            if report.absorb(decoder.process(&record), self.config.max_errors) {
                report.abort(AbortReason::TooManyErrors);
                return Ok(());
            }
        }
    }

    fn run_parallel<R: BufRead>(
        &self,
        parser: &mut StreamingParser<R>,
        decoder: &RowDecoder<'_>,
        report: &mut ReportBuilder,
    ) -> Result<()> {
        let batch_size = self.config.batch_size;
        loop {
            let mut batch = Vec::with_capacity(batch_size);
            let mut cancelled = false;
            let mut failure = None;
            let mut exhausted = false;
            while batch.len() < batch_size {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match parser.next_record() {
                    Ok(Some(record)) => batch.push(record),
                    Ok(None) => {
                        exhausted = true;
                        break;
                    },
                    Err(err) => {
                        failure = Some(err);
                        break;
                    },
                }
            }

            let outcomes = decode_batch(decoder, &batch, self.config.workers)?;
            debug!(rows = outcomes.len(), "Decoded batch");
            for outcome in outcomes {
                if report.absorb(outcome, self.config.max_errors) {
                    report.abort(AbortReason::TooManyErrors);
                    return Ok(());
                }
            }

            if let Some(err) = failure {
                return Err(err);
            }
            if cancelled {
                report.abort(AbortReason::Cancelled);
                return Ok(());
            }
            if exhausted {
                return Ok(());
            }
        }
    }
}

/// Decodes one batch on up to `workers` scoped threads, in input order.
fn decode_batch(
    decoder: &RowDecoder<'_>,
    batch: &[ParsedRecord],
    workers: usize,
) -> Result<Vec<RowOutcome>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    let tagged: Vec<(usize, &ParsedRecord)> = batch.iter().enumerate().collect();
    let chunk_len = tagged.len().div_ceil(workers);

    type Joined = std::thread::Result<Vec<(usize, RowOutcome)>>;
    let joined: Vec<Joined> = std::thread::scope(|scope| {
        let handles: Vec<_> = tagged
            .chunks(chunk_len)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|(index, record)| (*index, decoder.process(record)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(std::thread::ScopedJoinHandle::join)
            .collect()
    });

    let parts = joined
        .into_iter()
        .collect::<std::thread::Result<Vec<_>>>()
        .map_err(|_| Error::OperationFailed {
            operation: "decode_batch".to_string(),
            cause: "decode worker panicked".to_string(),
        })?;
    Ok(merge_in_order(parts))
}

/// Merges index-tagged worker output back into input order.
fn merge_in_order<T>(parts: Vec<Vec<(usize, T)>>) -> Vec<T> {
    let mut tagged: Vec<(usize, T)> = parts.into_iter().flatten().collect();
    tagged.sort_by_key(|(index, _)| *index);
    tagged.into_iter().map(|(_, item)| item).collect()
}

/// Result of [`IngestService::ingest`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    /// The run's report.
    pub report: IngestionReport,
    /// Store outcome, when records were saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<SaveOutcome>,
}

/// Ingests input and optionally saves the accepted records.
///
/// Records are saved only when the run completed; an aborted run leaves
/// the store untouched.
pub struct IngestService {
    pipeline: IngestionPipeline,
    store: Option<Arc<dyn RecordStore>>,
}

impl IngestService {
    /// Creates a service that does not save records.
    #[must_use]
    pub const fn new(pipeline: IngestionPipeline) -> Self {
        Self {
            pipeline,
            store: None,
        }
    }

    /// Saves accepted records of completed runs to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Returns the pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    /// Ingests `reader` and saves the retained records.
    ///
    /// # Errors
    ///
    /// Returns an [`IngestFailure`] if ingestion fails or the store rejects
    /// the records; in the latter case the partial report is complete.
    #[instrument(skip(self, reader, schema))]
    pub fn ingest<R: BufRead>(
        &self,
        reader: R,
        schema: &Schema,
    ) -> std::result::Result<IngestResult, IngestFailure> {
        let report = self.pipeline.ingest(reader, schema)?;
        self.save(report)
    }

    /// Ingests the file at `path` and saves the retained records.
    ///
    /// # Errors
    ///
    /// See [`ingest`](Self::ingest).
    pub fn ingest_path(
        &self,
        path: &Path,
        schema: &Schema,
    ) -> std::result::Result<IngestResult, IngestFailure> {
        let report = self.pipeline.ingest_path(path, schema)?;
        self.save(report)
    }

    fn save(&self, report: IngestionReport) -> std::result::Result<IngestResult, IngestFailure> {
        let Some(store) = &self.store else {
            return Ok(IngestResult {
                report,
                saved: None,
            });
        };
        if !report.is_complete() {
            warn!(state = %report.state, "Run incomplete, nothing saved");
            return Ok(IngestResult {
                report,
                saved: None,
            });
        }
        if report.records_truncated {
            warn!(
                kept = report.records.len(),
                accepted = report.accepted_count,
                "Saving retained records only"
            );
        }
        match store.save(&report.records) {
            Ok(outcome) => {
                info!(saved = outcome.saved, total = outcome.total, "Saved accepted records");
                Ok(IngestResult {
                    report,
                    saved: Some(outcome),
                })
            },
            Err(err) => Err(IngestFailure::new(err, report)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CsvDialect;
    use crate::models::{ColumnDef, ColumnType, Value};
    use crate::storage::{InMemoryRecordStore, RecordQuery};
    use std::io::{self, Read};

    fn people() -> Schema {
        Schema::new(vec![
            ColumnDef::new("id", ColumnType::Integer).required(),
            ColumnDef::new("name", ColumnType::Text),
            ColumnDef::new("joined", ColumnType::Date).with_format("yyyy-MM-dd"),
        ])
        .unwrap()
    }

    fn ingest(input: &str, config: IngestConfig) -> IngestionReport {
        IngestionPipeline::new(config)
            .ingest(input.as_bytes(), &people())
            .unwrap()
    }

    /// Yields its input one line per read call, then fails.
    struct LineReader {
        lines: Vec<&'static str>,
        next: usize,
        fail_at_end: bool,
        cancel_on: Option<(usize, CancellationToken)>,
    }

    impl Read for LineReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some((call, token)) = &self.cancel_on {
                if *call == self.next {
                    token.cancel();
                }
            }
            let Some(line) = self.lines.get(self.next) else {
                if self.fail_at_end {
                    return Err(io::Error::other("connection reset"));
                }
                return Ok(0);
            };
            self.next += 1;
            buf[..line.len()].copy_from_slice(line.as_bytes());
            Ok(line.len())
        }
    }

    #[test]
    fn test_mixed_rows() {
        let report = ingest(
            "id,name,joined\n1,Alice,2024-01-10\n,Bob,2024-02-05\n3,Carol,not-a-date\n",
            IngestConfig::default(),
        );
        assert_eq!(report.state, PipelineState::Finalized);
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.accepted_count, 1);
        assert_eq!(report.rejected_count, 2);
        assert!(report.is_accounted());
        assert_eq!(report.headers, vec!["id", "name", "joined"]);

        let bob: Vec<_> = report.errors_for_row(2).collect();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].kind, ErrorKind::NullNotAllowed);
        assert_eq!(bob[0].column.as_deref(), Some("id"));

        let carol: Vec<_> = report.errors_for_row(3).collect();
        assert_eq!(carol[0].kind, ErrorKind::FormatMismatch);
        assert_eq!(carol[0].column.as_deref(), Some("joined"));

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].values[1], Value::from("Alice"));
    }

    #[test]
    fn test_missing_required_column_aborts() {
        let report = ingest("name,joined\nAlice,2024-01-10\n", IngestConfig::default());
        assert_eq!(report.state, PipelineState::Aborted);
        assert_eq!(report.abort_reason, Some(AbortReason::MissingColumns));
        assert_eq!(report.total_rows, 0);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ErrorKind::MissingColumn);
        assert_eq!(report.errors[0].column.as_deref(), Some("id"));
    }

    #[test]
    fn test_missing_nullable_column_reads_null() {
        let report = ingest("id,name\n1,Alice\n", IngestConfig::default());
        assert!(report.is_complete());
        assert_eq!(report.accepted_count, 1);
        assert_eq!(report.records[0].values[2], Value::Null);
    }

    #[test]
    fn test_malformed_header_aborts() {
        let report = ingest("id,\"name\"x,joined\n1,a,2024-01-01\n", IngestConfig::default());
        assert_eq!(report.abort_reason, Some(AbortReason::InvalidHeader));
        assert_eq!(report.errors[0].kind, ErrorKind::MalformedQuote);
        assert_eq!(report.total_rows, 0);
    }

    #[test]
    fn test_zero_threshold_aborts_on_first_error() {
        let report = ingest(
            "id,name,joined\n1,a,2024-01-01\nx,b,2024-01-02\n3,c,2024-01-03\n",
            IngestConfig::default().with_max_errors(0),
        );
        assert_eq!(report.state, PipelineState::Aborted);
        assert_eq!(report.abort_reason, Some(AbortReason::TooManyErrors));
        assert_eq!(report.accepted_count, 1);
        assert_eq!(report.rejected_count, 1);
        assert_eq!(report.total_rows, 2);
    }

    #[test]
    fn test_warnings_do_not_count_toward_threshold() {
        let report = ingest(
            "id,name,joined,extra\n1,a,2024-01-01,x\n2,b,2024-01-02,y\n",
            IngestConfig::default().with_max_errors(0),
        );
        assert!(report.is_complete());
        assert_eq!(report.warning_count(), 2);
        assert_eq!(report.accepted_count, 2);
    }

    #[test]
    fn test_unterminated_quote_does_not_corrupt_later_rows() {
        let report = ingest(
            "id,name,joined\n1,\"open,2024-01-01\n2,b,2024-01-02\n",
            IngestConfig::default(),
        );
        assert!(report.is_complete());
        assert_eq!(report.errors[0].kind, ErrorKind::UnterminatedQuote);
        assert_eq!(report.accepted_count, 1);
        assert_eq!(report.records[0].values[0], Value::Integer(2));
        assert!(report.is_accounted());
    }

    #[test]
    fn test_headerless_input() {
        let config =
            IngestConfig::default().with_dialect(CsvDialect::default().with_header(false));
        let report = ingest("1,a,2024-01-01\n2,b\n", config);
        assert!(report.headers.is_empty());
        assert_eq!(report.accepted_count, 1);
        assert_eq!(report.errors[0].kind, ErrorKind::FieldCountMismatch);
    }

    #[test]
    fn test_retention_sample() {
        let report = ingest(
            "id\n1\n2\n3\n",
            IngestConfig::default().with_retention(RecordRetention::Sample(2)),
        );
        assert_eq!(report.accepted_count, 3);
        assert_eq!(report.records.len(), 2);
        assert!(report.records_truncated);
    }

    #[test]
    fn test_empty_input() {
        let report = ingest("", IngestConfig::default());
        assert!(report.is_complete());
        assert_eq!(report.total_rows, 0);
    }

    #[test]
    fn test_invalid_config_fails_before_start() {
        let config = IngestConfig::default().with_workers(0);
        let failure = IngestionPipeline::new(config)
            .ingest("id\n1\n".as_bytes(), &people())
            .unwrap_err();
        assert!(matches!(failure.error, Error::InvalidInput(_)));
        assert_eq!(failure.partial.state, PipelineState::Init);
    }

    #[test]
    fn test_reader_failure_keeps_partial_report() {
        let reader = LineReader {
            lines: vec!["id,name,joined\n", "1,a,2024-01-01\n", "2,b,2024-01-02\n"],
            next: 0,
            fail_at_end: true,
            cancel_on: None,
        };
        let failure = IngestionPipeline::default()
            .ingest(BufReader::with_capacity(16, reader), &people())
            .unwrap_err();
        assert!(matches!(failure.error, Error::OperationFailed { .. }));
        assert_eq!(failure.partial.state, PipelineState::Aborted);
        assert_eq!(failure.partial.abort_reason, Some(AbortReason::IoFailure));
        assert_eq!(failure.partial.accepted_count, 2);
    }

    #[test]
    fn test_pre_cancelled_run_reads_nothing() {
        let pipeline = IngestionPipeline::default();
        pipeline.cancellation_token().cancel();
        let report = pipeline
            .ingest("id\n1\n2\n".as_bytes(), &people())
            .unwrap();
        assert!(report.is_cancelled());
        assert_eq!(report.total_rows, 0);
    }

    #[test]
    fn test_cancel_mid_run_returns_partial_report() {
        let token = CancellationToken::new();
        let reader = LineReader {
            lines: vec![
                "id,name,joined\n",
                "1,a,2024-01-01\n",
                "2,b,2024-01-02\n",
                "3,c,2024-01-03\n",
                "4,d,2024-01-04\n",
            ],
            next: 0,
            fail_at_end: false,
            cancel_on: Some((2, token.clone())),
        };
        let report = IngestionPipeline::default()
            .with_cancellation(token)
            .ingest(BufReader::with_capacity(16, reader), &people())
            .unwrap();
        assert_eq!(report.state, PipelineState::Aborted);
        assert!(report.is_cancelled());
        assert!(report.total_rows < 4);
        assert!(report.is_accounted());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        use std::fmt::Write as _;
        let mut input = String::from("id,name,joined\n");
        for i in 0..257 {
            if i % 7 == 0 {
                let _ = writeln!(input, ",n{i},2024-01-01");
            } else {
                let _ = writeln!(input, "{i},n{i},2024-01-{:02}", i % 28 + 1);
            }
        }
        let sequential = ingest(&input, IngestConfig::default());
        let parallel = ingest(
            &input,
            IngestConfig::default().with_workers(4).with_batch_size(10),
        );
        assert_eq!(parallel.records, sequential.records);
        assert_eq!(parallel.errors, sequential.errors);
        assert_eq!(parallel.accepted_count, sequential.accepted_count);
        assert_eq!(parallel.total_rows, 257);
    }

    #[test]
    fn test_parallel_threshold_stops_mid_batch() {
        let input = "id\nx\n2\n3\nx\n5\n";
        let report = ingest(
            input,
            IngestConfig::default()
                .with_workers(2)
                .with_batch_size(8)
                .with_max_errors(0),
        );
        assert_eq!(report.abort_reason, Some(AbortReason::TooManyErrors));
        assert_eq!(report.total_rows, 1);
        assert_eq!(report.accepted_count, 0);
    }

    #[test]
    fn test_merge_in_order() {
        let parts = vec![
            vec![(3, 'd'), (4, 'e')],
            vec![(0, 'a')],
            vec![],
            vec![(1, 'b'), (2, 'c')],
        ];
        assert_eq!(merge_in_order(parts), vec!['a', 'b', 'c', 'd', 'e']);
    }

    #[test]
    fn test_service_saves_complete_runs_only() {
        let store = Arc::new(InMemoryRecordStore::new());
        let service = IngestService::new(IngestionPipeline::new(
            IngestConfig::default().with_max_errors(0),
        ))
        .with_store(store.clone());

        let ok = service
            .ingest("id,name\n1,a\n2,b\n".as_bytes(), &people())
            .unwrap();
        assert_eq!(ok.saved.map(|s| s.saved), Some(2));

        let aborted = service
            .ingest("id,name\n3,c\nx,d\n".as_bytes(), &people())
            .unwrap();
        assert!(aborted.saved.is_none());
        assert_eq!(store.load(&RecordQuery::all()).unwrap().len(), 2);
    }

    #[test]
    fn test_failure_converts_to_error() {
        let failure = IngestFailure::before_start(Error::InvalidInput("bad".to_string()));
        assert!(failure.to_string().contains("after 0 rows"));
        let err: Error = failure.into();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
