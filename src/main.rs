//! Binary entry point for csvgate.
//!
//! This binary provides the CLI interface for validating, normalizing and
//! analyzing CSV files.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    ExportArgs, IngestArgs, PricesArgs, cmd_export, cmd_ingest, cmd_prices, cmd_schema,
};
use csvgate::config::AppConfig;
use csvgate::observability;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// csvgate - Streaming CSV ingestion with schema validation.
#[derive(Parser)]
#[command(name = "csvgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Validate a CSV file against a schema and print the report.
    Ingest(IngestArgs),

    /// Ingest a CSV file and write its accepted records as CSV or NDJSON.
    Export(ExportArgs),

    /// Check and describe a schema file.
    Schema {
        /// Schema file (TOML, JSON or YAML).
        file: PathBuf,

        /// Print the schema as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Price statistics over price feed files.
    Prices(PricesArgs),
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_settings(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = run_command(cli.command, &config).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(command: Commands, config: &AppConfig) -> csvgate::Result<()> {
    match command {
        Commands::Ingest(args) => cmd_ingest(args, config).await,
        Commands::Export(args) => cmd_export(args, config).await,
        Commands::Schema { file, json } => cmd_schema(&file, json),
        Commands::Prices(args) => cmd_prices(args, config).await,
    }
}

/// Loads configuration, then applies environment overrides.
fn load_config(path: Option<&Path>) -> csvgate::Result<AppConfig> {
    let mut config = if let Some(config_path) = path {
        AppConfig::load_from_file(config_path)?
    } else {
        match std::env::var("CSVGATE_CONFIG_PATH") {
            Ok(config_path) if !config_path.trim().is_empty() => {
                AppConfig::load_from_file(Path::new(&config_path))?
            },
            _ => AppConfig::load_default(),
        }
    };
    config.apply_env_overrides()?;
    Ok(config)
}
