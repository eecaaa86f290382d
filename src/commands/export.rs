//! Export command handler.

use super::{DialectArgs, report_failure, run_cancellable};
use clap::Args;
use csvgate::config::{AppConfig, ExportConfig, RecordRetention};
use csvgate::io::{ExportOptions, ExportService, Format, IngestService};
use csvgate::{Error, InMemoryRecordStore, IngestionPipeline, RecordStore, Result, Schema};
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments of the export command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// CSV file to normalize.
    pub file: PathBuf,

    /// Schema file (TOML, JSON or YAML).
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Output file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output format: csv or json (default: from the output extension).
    #[arg(short, long)]
    pub format: Option<String>,

    #[command(flatten)]
    pub dialect: DialectArgs,
}

/// Executes the export command.
///
/// Ingests the input, then writes the accepted records back out.
pub async fn cmd_export(args: ExportArgs, config: &AppConfig) -> Result<()> {
    let format = args
        .format
        .as_deref()
        .map(str::parse::<Format>)
        .transpose()?;
    let schema = Arc::new(Schema::load_from_file(&args.schema)?);

    let mut ingest = config.ingest.clone();
    ingest.dialect = args.dialect.apply(ingest.dialect)?;
    ingest.retention = RecordRetention::All;
    let export_config = ExportConfig::from(&ingest.dialect);

    let store = Arc::new(InMemoryRecordStore::new());
    let pipeline = IngestionPipeline::new(ingest);
    let token = pipeline.cancellation_token();
    let service =
        IngestService::new(pipeline).with_store(Arc::clone(&store) as Arc<dyn RecordStore>);

    let result = {
        let schema = Arc::clone(&schema);
        let file = args.file.clone();
        run_cancellable(token, move || {
            service.ingest_path(&file, &schema).map_err(report_failure)
        })
        .await?
    };

    let report = &result.report;
    if result.saved.is_none() {
        return Err(Error::OperationFailed {
            operation: "export".to_string(),
            cause: format!(
                "ingestion ended in state {}; nothing exported",
                report.state
            ),
        });
    }

    let mut options = ExportOptions::default().with_config(export_config);
    if let Some(format) = format {
        options = options.with_format(format);
    }
    let exported = ExportService::new(store).export_to_file(&args.output, &schema, options)?;

    println!(
        "Exported {} records to {} ({} rows rejected)",
        exported.exported,
        args.output.display(),
        report.rejected_count
    );
    Ok(())
}
