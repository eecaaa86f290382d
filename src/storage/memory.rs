//! In-memory record store.

use super::traits::{RecordQuery, RecordStore, SaveOutcome};
use crate::models::Record;
use crate::{Error, Result};
use std::sync::RwLock;

/// In-memory record store.
///
/// Uses `RwLock` for thread-safe access with reader-writer semantics.
/// Data is not persisted between runs.
///
/// # Example
///
/// ```rust
/// use csvgate::{InMemoryRecordStore, Record, RecordQuery, RecordStore, Value};
///
/// let store = InMemoryRecordStore::new();
/// store.save(&[Record::new(vec![Value::Integer(1)])])?;
/// assert_eq!(store.load(&RecordQuery::all())?.len(), 1);
/// # Ok::<(), csvgate::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<Record>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every record.
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }
}

fn poisoned(operation: &str) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: "Lock poisoned".to_string(),
    }
}

impl RecordStore for InMemoryRecordStore {
    fn save(&self, records: &[Record]) -> Result<SaveOutcome> {
        let mut stored = self.records.write().map_err(|_| poisoned("save_records"))?;
        stored.extend_from_slice(records);
        Ok(SaveOutcome {
            saved: records.len(),
            total: stored.len(),
        })
    }

    fn load(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        let stored = self.records.read().map_err(|_| poisoned("load_records"))?;
        Ok(stored
            .iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize> {
        let stored = self.records.read().map_err(|_| poisoned("count_records"))?;
        Ok(stored.len())
    }
}
