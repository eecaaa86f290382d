//! Command handlers module.
//!
//! This module organizes the CLI command implementations into separate files:
//! - `ingest.rs`: validate a CSV file and print its report
//! - `export.rs`: normalize a CSV file into CSV or NDJSON
//! - `schema.rs`: check and describe a schema file
//! - `prices.rs`: price feed statistics

mod export;
mod ingest;
mod prices;
mod schema;

use clap::Args;
use csvgate::config::parse_dialect_char;
use csvgate::{CancellationToken, CsvDialect, Error, Escape, IngestFailure, Result};
use tracing::warn;

// Re-export command functions
pub use export::{ExportArgs, cmd_export};
pub use ingest::{IngestArgs, cmd_ingest};
pub use prices::{PricesArgs, cmd_prices};
pub use schema::cmd_schema;

/// Dialect flags shared by commands that read CSV.
#[derive(Args, Debug, Clone, Default)]
pub struct DialectArgs {
    /// Field delimiter: one character, or `tab`.
    #[arg(short, long)]
    pub delimiter: Option<String>,

    /// Quote character.
    #[arg(long)]
    pub quote: Option<String>,

    /// Escape quotes inside quoted fields with a backslash instead of doubling.
    #[arg(long)]
    pub backslash_escape: bool,

    /// Treat the first line as data rather than a header.
    #[arg(long)]
    pub no_header: bool,

    /// Field text that reads as null.
    #[arg(long)]
    pub null: Option<String>,
}

impl DialectArgs {
    /// Applies the flags on top of `dialect`.
    pub fn apply(&self, mut dialect: CsvDialect) -> Result<CsvDialect> {
        if let Some(delimiter) = &self.delimiter {
            dialect.delimiter = parse_dialect_char("--delimiter", delimiter)?;
        }
        if let Some(quote) = &self.quote {
            dialect.quote = parse_dialect_char("--quote", quote)?;
        }
        if self.backslash_escape {
            dialect.escape = Escape::Backslash;
        }
        if self.no_header {
            dialect.has_header = false;
        }
        if let Some(null) = &self.null {
            dialect.null_value.clone_from(null);
        }
        dialect.validate()?;
        Ok(dialect)
    }
}

/// Runs a blocking ingestion job, cancelling it on Ctrl-C.
pub async fn run_cancellable<T, F>(token: CancellationToken, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next row");
            token.cancel();
        }
    });

    let joined = tokio::task::spawn_blocking(job).await;
    watcher.abort();
    joined.map_err(|e| Error::OperationFailed {
        operation: "ingest_task".to_string(),
        cause: e.to_string(),
    })?
}

/// Prints what a failed run got through before failing.
pub fn report_failure(failure: IngestFailure) -> Error {
    let partial = &failure.partial;
    eprintln!(
        "Run failed after {} rows ({} accepted, {} rejected)",
        partial.total_rows, partial.accepted_count, partial.rejected_count
    );
    failure.error
}
