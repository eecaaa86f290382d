//! Analytics over ingested records.
//!
//! Currently price statistics for per-symbol price feeds.

mod prices;

pub use prices::{
    NormalizedRange, PriceBook, PriceEntry, PriceStats, price_schema, symbol_from_path,
};
