//! Prices command handler.

use super::{report_failure, run_cancellable};
use chrono::{NaiveDate, TimeDelta, Utc};
use clap::Args;
use csvgate::analytics::{PriceBook, price_schema, symbol_from_path};
use csvgate::config::{AppConfig, IngestConfig};
use csvgate::{CancellationToken, Error, IngestionPipeline, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

/// Arguments of the prices command.
#[derive(Args, Debug)]
pub struct PricesArgs {
    /// Price feed files (`timestamp,symbol,price`).
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Show statistics for one symbol.
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Restrict symbol statistics to the last N days.
    #[arg(long, requires = "symbol")]
    pub since_days: Option<u32>,

    /// Show the symbol with the highest normalized range on this UTC day.
    #[arg(long, conflicts_with = "symbol")]
    pub date: Option<NaiveDate>,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the prices command.
pub async fn cmd_prices(args: PricesArgs, config: &AppConfig) -> Result<()> {
    let ingest = IngestConfig::default().with_dialect(config.ingest.dialect.clone());
    let files = args.files.clone();
    let token = CancellationToken::new();
    let pipeline = IngestionPipeline::new(ingest).with_cancellation(token.clone());
    let book = run_cancellable(token, move || load_book(&pipeline, &files)).await?;

    if let Some(symbol) = &args.symbol {
        let stats = match args.since_days {
            Some(days) => {
                let since = Utc::now()
                    .checked_sub_signed(TimeDelta::days(i64::from(days)))
                    .ok_or_else(|| Error::InvalidInput(format!("--since-days {days} is out of range")))?;
                book.stats_since(symbol, since)?
            },
            None => book.stats(symbol)?,
        };
        if args.json {
            return print_json(&stats);
        }
        println!("{}", stats.symbol);
        println!("  oldest: {}", stats.oldest);
        println!("  newest: {}", stats.newest);
        println!("  min:    {}", stats.min);
        println!("  max:    {}", stats.max);
        return Ok(());
    }

    if let Some(date) = args.date {
        let best = book.highest_normalized_range(date);
        if args.json {
            return print_json(&best);
        }
        match best {
            Some(best) => println!("{date}: {} ({:.4})", best.symbol, best.normalized_range),
            None => println!("{date}: no prices"),
        }
        return Ok(());
    }

    let ranges = book.normalized_ranges();
    if args.json {
        return print_json(&ranges);
    }
    for range in ranges {
        println!("  {:<10} {:.4}", range.symbol, range.normalized_range);
    }
    Ok(())
}

fn load_book(pipeline: &IngestionPipeline, files: &[PathBuf]) -> Result<PriceBook> {
    let schema = price_schema()?;
    let mut book = PriceBook::new();
    for file in files {
        if let Some(symbol) = symbol_from_path(file) {
            book.register(&symbol);
        }
        let report = pipeline.ingest_path(file, &schema).map_err(report_failure)?;
        if !report.is_complete() {
            return Err(Error::OperationFailed {
                operation: "load_prices".to_string(),
                cause: format!("{}: ingestion ended in state {}", file.display(), report.state),
            });
        }
        if report.rejected_count > 0 {
            warn!(
                file = %file.display(),
                rejected = report.rejected_count,
                "Skipped invalid price rows"
            );
        }
        book.extend(PriceBook::from_records(&schema, &report.records)?);
    }
    Ok(book)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_prices".to_string(),
        cause: e.to_string(),
    })?;
    println!("{text}");
    Ok(())
}
