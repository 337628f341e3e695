//! Modification log: one timestamp per write-mode open
//!
//! Stored as the root `file_create_date` dataset, mirrored into its
//! `modification_time` attribute. Entries are only ever appended, and an
//! entry earlier than its predecessor is clamped so the log stays
//! non-decreasing.

use chrono::{DateTime, Utc};

use crate::store::{ContainerStore, Value};
use crate::{Error, Result};

/// Root dataset holding the log.
pub const LOG_FIELD: &str = "file_create_date";

/// Ordered, append-only list of open-for-write timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationLog {
    entries: Vec<DateTime<Utc>>,
}

impl ModificationLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log stored in `store` (empty if there is none).
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` if the dataset is not a timestamp list.
    pub fn load<S: ContainerStore>(store: &S) -> Result<Self> {
        let root = store.open_node("")?;
        match store.read_dataset(root, LOG_FIELD) {
            Ok(dataset) => match dataset.into_value()? {
                Value::Times(entries) => Ok(Self { entries }),
                other => Err(Error::TypeMismatch {
                    expected: "timestamp list".to_string(),
                    found: format!("{other:?}"),
                }),
            },
            Err(Error::NotFound(_)) => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    /// Append `now`, clamped to the last entry if the clock went backwards.
    pub fn append(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let entry = match self.entries.last() {
            Some(last) if now < *last => {
                tracing::warn!("clock went backwards ({now} < {last}), reusing last modification time");
                *last
            }
            _ => now,
        };
        self.entries.push(entry);
        entry
    }

    /// Entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[DateTime<Utc>] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the log dataset and its `modification_time` attribute.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects a write.
    pub fn write<S: ContainerStore>(&self, store: &mut S) -> Result<()> {
        let root = store.create_node("")?;
        let id = store.write_dataset(root, LOG_FIELD, Value::Times(self.entries.clone()))?;
        store.set_attribute(id, "modification_time", Value::Times(self.entries.clone()))
    }
}
