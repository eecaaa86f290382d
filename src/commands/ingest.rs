//! Ingest command handler.

use super::{DialectArgs, report_failure, run_cancellable};
use clap::Args;
use csvgate::config::{AppConfig, ExportConfig, IngestConfig, RecordRetention};
use csvgate::io::export_csv;
use csvgate::{Error, IngestionPipeline, IngestionReport, PipelineState, Result, Schema};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Entries listed in a text report before truncating.
const MAX_LISTED_ERRORS: usize = 20;

/// Arguments of the ingest command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// CSV file to ingest.
    pub file: PathBuf,

    /// Schema file (TOML, JSON or YAML).
    #[arg(short, long)]
    pub schema: PathBuf,

    #[command(flatten)]
    pub dialect: DialectArgs,

    /// Abort once more than this many errors are recorded.
    #[arg(long)]
    pub max_errors: Option<usize>,

    /// Keep only the first N accepted records.
    #[arg(long)]
    pub sample: Option<usize>,

    /// Decode worker threads.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Write accepted records to this CSV file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl IngestArgs {
    fn ingest_config(&self, config: &AppConfig) -> Result<IngestConfig> {
        let mut ingest = config.ingest.clone();
        ingest.dialect = self.dialect.apply(ingest.dialect)?;
        if let Some(max_errors) = self.max_errors {
            ingest.max_errors = Some(max_errors);
        }
        if let Some(sample) = self.sample {
            ingest.retention = RecordRetention::Sample(sample);
        }
        if let Some(workers) = self.workers {
            ingest.workers = workers;
        }
        ingest.validate()?;
        Ok(ingest)
    }
}

/// Executes the ingest command.
pub async fn cmd_ingest(args: IngestArgs, config: &AppConfig) -> Result<()> {
    let schema = Arc::new(Schema::load_from_file(&args.schema)?);
    let ingest_config = args.ingest_config(config)?;
    let export_config = ExportConfig::from(&ingest_config.dialect);
    let pipeline = IngestionPipeline::new(ingest_config);

    let report = {
        let schema = Arc::clone(&schema);
        let file = args.file.clone();
        let token = pipeline.cancellation_token();
        run_cancellable(token, move || {
            pipeline
                .ingest_path(&file, &schema)
                .map_err(report_failure)
        })
        .await?
    };

    print_report(&report, args.json)?;

    if let Some(output) = &args.output {
        if report.records_truncated {
            warn!(
                kept = report.records.len(),
                accepted = report.accepted_count,
                "Writing retained records only"
            );
        }
        let file = File::create(output).map_err(|e| Error::OperationFailed {
            operation: "create_output_file".to_string(),
            cause: format!("{}: {e}", output.display()),
        })?;
        let summary = export_csv(BufWriter::new(file), &report.records, &schema, &export_config)?;
        info!(path = %output.display(), records = summary.records, "Wrote accepted records");
    }

    match report.abort_reason {
        Some(reason) if report.state == PipelineState::Aborted => Err(Error::OperationFailed {
            operation: "ingest".to_string(),
            cause: format!("run aborted: {reason}"),
        }),
        _ => Ok(()),
    }
}

/// Prints a report as text or JSON.
pub fn print_report(report: &IngestionReport, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(report).map_err(|e| Error::OperationFailed {
            operation: "serialize_report".to_string(),
            cause: e.to_string(),
        })?;
        println!("{text}");
        return Ok(());
    }

    match report.abort_reason {
        Some(reason) => println!("State:     {} ({reason})", report.state),
        None => println!("State:     {}", report.state),
    }
    println!(
        "Rows:      {} ({} accepted, {} rejected)",
        report.total_rows, report.accepted_count, report.rejected_count
    );
    println!("Warnings:  {}", report.warning_count());
    println!("Duration:  {} ms", report.duration_ms);

    if !report.errors.is_empty() {
        println!();
        println!("Issues ({}):", report.errors.len());
        for issue in report.errors.iter().take(MAX_LISTED_ERRORS) {
            println!("  - {issue}");
        }
        if report.errors.len() > MAX_LISTED_ERRORS {
            println!("  ... and {} more", report.errors.len() - MAX_LISTED_ERRORS);
        }
    }
    Ok(())
}
