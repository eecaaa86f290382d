//! Record store trait.

use crate::Result;
use crate::models::Record;
use serde::Serialize;

/// Trait for record storage backends.
///
/// Implementations must be safe to share between threads; callers holding an
/// `Arc<dyn RecordStore>` may save and load concurrently.
pub trait RecordStore: Send + Sync {
    /// Appends records in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot store the records.
    fn save(&self, records: &[Record]) -> Result<SaveOutcome>;

    /// Loads records in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn load(&self, query: &RecordQuery) -> Result<Vec<Record>>;

    /// Returns the total count of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn count(&self) -> Result<usize> {
        Ok(self.load(&RecordQuery::all())?.len())
    }
}

/// Result of [`RecordStore::save`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    /// Records stored by this call.
    pub saved: usize,
    /// Records in the store after this call.
    pub total: usize,
}

/// Window over stored records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Records to skip.
    pub offset: usize,
    /// Maximum records to return.
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Every stored record.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }

    /// Sets the number of records to skip.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the maximum number of records.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
