//! Price statistics.
//!
//! A price feed is CSV with `timestamp,symbol,price` rows, where `timestamp`
//! is epoch milliseconds. Feeds are ingested with [`price_schema`] and the
//! accepted records loaded into a [`PriceBook`].
//!
//! All calendar computations use UTC.

use crate::models::{ColumnDef, ColumnType, Record, Schema, Value};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const FEED_SUFFIX: &str = "_values.csv";

/// Schema of a price feed.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the column set fails schema validation.
pub fn price_schema() -> Result<Schema> {
    let columns = vec![
        ColumnDef::new("timestamp", ColumnType::Integer).required(),
        ColumnDef::new("symbol", ColumnType::Text).required(),
        ColumnDef::new("price", ColumnType::Decimal).required(),
    ];
    Ok(Schema::new(columns)?.named("prices"))
}

/// Symbol named by a feed file such as `BTC_values.csv`.
#[must_use]
pub fn symbol_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(FEED_SUFFIX)?;
    (!stem.is_empty()).then(|| stem.to_uppercase())
}

/// One price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceEntry {
    /// Observation time.
    pub at: DateTime<Utc>,
    /// Observed price.
    pub price: Decimal,
}

/// Summary of a symbol's prices over some window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceStats {
    /// Upper-case symbol.
    pub symbol: String,
    /// Price of the earliest observation.
    pub oldest: Decimal,
    /// Price of the latest observation.
    pub newest: Decimal,
    /// Lowest price.
    pub min: Decimal,
    /// Highest price.
    pub max: Decimal,
}

/// `(max - min) / min` for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRange {
    /// Upper-case symbol.
    pub symbol: String,
    /// Normalized range; zero when the minimum price is zero.
    pub normalized_range: Decimal,
    /// Day the range was computed for, if restricted to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// Price observations grouped by symbol.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    entries: BTreeMap<String, Vec<PriceEntry>>,
}

impl PriceBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a book from records accepted under `schema`.
    ///
    /// `schema` must have `timestamp`, `symbol` and `price` columns; see
    /// [`price_schema`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a column is missing from the schema,
    /// a record lacks a value, or a timestamp is out of range.
    pub fn from_records(schema: &Schema, records: &[Record]) -> Result<Self> {
        let position = |name: &str| {
            schema
                .position(name)
                .ok_or_else(|| Error::InvalidInput(format!("price schema lacks column '{name}'")))
        };
        let (timestamp, symbol, price) =
            (position("timestamp")?, position("symbol")?, position("price")?);

        let mut book = Self::new();
        for record in records {
            let value = |i: usize| record.values.get(i);
            let (Some(millis), Some(name), Some(amount)) = (
                value(timestamp).and_then(Value::as_integer),
                value(symbol).and_then(Value::as_text),
                value(price).and_then(Value::as_decimal),
            ) else {
                return Err(Error::InvalidInput(format!(
                    "row {} is not a complete price entry",
                    record.row
                )));
            };
            let at = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "row {}: timestamp {millis} is out of range",
                    record.row
                ))
            })?;
            book.insert(name, PriceEntry { at, price: amount });
        }
        Ok(book)
    }

    /// Registers a symbol with no observations yet.
    pub fn register(&mut self, symbol: &str) {
        self.entries.entry(symbol.to_uppercase()).or_default();
    }

    /// Adds one observation.
    pub fn insert(&mut self, symbol: &str, entry: PriceEntry) {
        self.entries
            .entry(symbol.to_uppercase())
            .or_default()
            .push(entry);
    }

    /// Merges another book into this one.
    pub fn extend(&mut self, other: Self) {
        for (symbol, entries) in other.entries {
            self.entries.entry(symbol).or_default().extend(entries);
        }
    }

    /// Known symbols, sorted.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Statistics over every observation of `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown symbol, or
    /// [`Error::NoData`] if it has no observations.
    pub fn stats(&self, symbol: &str) -> Result<PriceStats> {
        let (name, entries) = self.lookup(symbol)?;
        summarize(name, entries.iter())
            .ok_or_else(|| Error::NoData(format!("there are no prices for '{name}'")))
    }

    /// Statistics over observations strictly after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown symbol, or
    /// [`Error::NoData`] if nothing was observed after `since`.
    pub fn stats_since(&self, symbol: &str, since: DateTime<Utc>) -> Result<PriceStats> {
        let (name, entries) = self.lookup(symbol)?;
        summarize(name, entries.iter().filter(|e| e.at > since)).ok_or_else(|| {
            Error::NoData(format!("there are no prices for '{name}' after {since}"))
        })
    }

    /// Normalized range of every symbol with observations, highest first.
    #[must_use]
    pub fn normalized_ranges(&self) -> Vec<NormalizedRange> {
        let mut ranges: Vec<NormalizedRange> = self
            .entries
            .iter()
            .filter_map(|(symbol, entries)| {
                normalized(entries.iter()).map(|normalized_range| NormalizedRange {
                    symbol: symbol.clone(),
                    normalized_range,
                    date: None,
                })
            })
            .collect();
        ranges.sort_by(|a, b| b.normalized_range.cmp(&a.normalized_range));
        ranges
    }

    /// Symbol with the highest normalized range on one UTC day.
    ///
    /// Ties go to the alphabetically first symbol. Returns `None` if no
    /// symbol has observations that day.
    #[must_use]
    pub fn highest_normalized_range(&self, date: NaiveDate) -> Option<NormalizedRange> {
        let mut best: Option<NormalizedRange> = None;
        for (symbol, entries) in &self.entries {
            let Some(range) = normalized(entries.iter().filter(|e| e.at.date_naive() == date))
            else {
                continue;
            };
            if best.as_ref().is_none_or(|b| range > b.normalized_range) {
                best = Some(NormalizedRange {
                    symbol: symbol.clone(),
                    normalized_range: range,
                    date: Some(date),
                });
            }
        }
        best
    }

    fn lookup(&self, symbol: &str) -> Result<(&str, &[PriceEntry])> {
        let name = symbol.trim().to_uppercase();
        self.entries
            .get_key_value(&name)
            .map(|(name, entries)| (name.as_str(), entries.as_slice()))
            .ok_or_else(|| Error::NotFound(format!("symbol '{name}' doesn't exist")))
    }
}

fn summarize<'e>(symbol: &str, entries: impl Iterator<Item = &'e PriceEntry>) -> Option<PriceStats> {
    let mut entries = entries.peekable();
    let first = *entries.peek()?;
    let mut stats = PriceStats {
        symbol: symbol.to_string(),
        oldest: first.price,
        newest: first.price,
        min: first.price,
        max: first.price,
    };
    let (mut oldest_at, mut newest_at) = (first.at, first.at);
    for entry in entries {
        if entry.at < oldest_at {
            oldest_at = entry.at;
            stats.oldest = entry.price;
        }
        if entry.at > newest_at {
            newest_at = entry.at;
            stats.newest = entry.price;
        }
        stats.min = stats.min.min(entry.price);
        stats.max = stats.max.max(entry.price);
    }
    Some(stats)
}

fn normalized<'e>(entries: impl Iterator<Item = &'e PriceEntry>) -> Option<Decimal> {
    let stats = summarize("", entries)?;
    if stats.min <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    Some(
        stats
            .max
            .checked_sub(stats.min)
            .and_then(|spread| spread.checked_div(stats.min))
            .unwrap_or(Decimal::ZERO),
    )
}
