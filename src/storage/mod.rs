//! Record storage.
//!
//! The pipeline itself has no side effects beyond its report; services hand
//! accepted records to a [`RecordStore`] when the caller wants them kept.

mod memory;
mod traits;

pub use memory::InMemoryRecordStore;
pub use traits::{RecordQuery, RecordStore, SaveOutcome};
