//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder the
//! calls are no-ops.

use crate::models::IngestionReport;

/// Records the outcome of one ingestion run.
pub fn record_ingest(report: &IngestionReport) {
    metrics::counter!("csvgate_ingest_runs_total", "state" => report.state.as_str()).increment(1);
    metrics::counter!("csvgate_rows_total", "outcome" => "accepted")
        .increment(report.accepted_count);
    metrics::counter!("csvgate_rows_total", "outcome" => "rejected")
        .increment(report.rejected_count);
    #[allow(clippy::cast_precision_loss)]
    metrics::histogram!("csvgate_ingest_duration_ms").record(report.duration_ms as f64);
}

/// Records exported records for a format.
pub fn record_export(format: &'static str, count: u64) {
    metrics::counter!("csvgate_records_exported_total", "format" => format).increment(count);
}
