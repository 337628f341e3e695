//! Epoch and tag registry
//!
//! Epochs are named intervals of a recording, each with its own tag set. The
//! registry is owned by one open container: it checks bounds and name
//! uniqueness (including epochs stored by earlier sessions) and, at close,
//! writes every new epoch plus the deduplicated union of all tags on the
//! `epochs` group.
//!
//! ## Example
//!
//! ```rust
//! use neurodata_db::epoch::EpochRegistry;
//!
//! # fn example() -> neurodata_db::Result<()> {
//! let mut registry = EpochRegistry::new();
//! let first = registry.create_epoch("epoch-1", 0.0, 3.0)?;
//! let second = registry.create_epoch("epoch-2", 1.0, 4.0)?;
//! registry.add_tag(first, "b")?;
//! registry.add_tag(first, "c")?;
//! registry.add_tag(second, "a")?;
//! registry.add_tag(second, "b")?;
//! assert_eq!(registry.aggregate_tags().into_iter().collect::<Vec<_>>(), ["a", "b", "c"]);
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::store::{check_segment, ContainerStore, Value};
use crate::{Error, Result};

/// Group holding all epochs.
pub const EPOCHS_PATH: &str = "epochs";

/// Handle to an epoch created in the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpochId(usize);

/// Named interval with its own tag set.
#[derive(Debug, Clone, PartialEq)]
pub struct Epoch {
    name: String,
    start: f64,
    stop: f64,
    description: Option<String>,
    tags: BTreeSet<String>,
}

impl Epoch {
    /// Epoch name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start time in seconds.
    #[must_use]
    pub const fn start(&self) -> f64 {
        self.start
    }

    /// Stop time in seconds.
    #[must_use]
    pub const fn stop(&self) -> f64 {
        self.stop
    }

    /// Tags, sorted.
    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }
}

/// Epochs of one open container.
#[derive(Debug, Clone, Default)]
pub struct EpochRegistry {
    epochs: Vec<Epoch>,
    stored: BTreeMap<String, BTreeSet<String>>,
}

impl EpochRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the epochs already stored in `store`.
    ///
    /// # Errors
    ///
    /// Returns error if the stored `epochs` group cannot be read.
    pub fn load<S: ContainerStore>(store: &S) -> Result<Self> {
        let mut registry = Self::new();
        let Ok(node) = store.open_node(EPOCHS_PATH) else {
            return Ok(registry);
        };
        for name in store.children(node)? {
            let epoch = store.open_node(&format!("{EPOCHS_PATH}/{name}"))?;
            let tags = match store.get_attribute(epoch, "tags") {
                Ok(Value::TextList(tags)) => tags.into_iter().collect(),
                Ok(_) | Err(Error::NotFound(_)) => BTreeSet::new(),
                Err(e) => return Err(e),
            };
            registry.stored.insert(name, tags);
        }
        Ok(registry)
    }

    /// Create an epoch spanning `[start, stop)` seconds.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRange` if `stop <= start`, either bound is NaN,
    /// or the name is already used.
    pub fn create_epoch(&mut self, name: &str, start: f64, stop: f64) -> Result<EpochId> {
        let invalid = |reason: &str| Error::InvalidRange {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        check_segment(name)?;
        if start.is_nan() || stop.is_nan() {
            return Err(invalid("bounds must be numbers"));
        }
        if stop <= start {
            return Err(invalid(&format!("stop {stop} must be after start {start}")));
        }
        if self.contains(name) {
            return Err(invalid("an epoch with this name already exists"));
        }
        self.epochs.push(Epoch {
            name: name.to_string(),
            start,
            stop,
            description: None,
            tags: BTreeSet::new(),
        });
        Ok(EpochId(self.epochs.len() - 1))
    }

    /// True if an epoch named `name` exists in this session or the stored
    /// container.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stored.contains_key(name) || self.epochs.iter().any(|e| e.name == name)
    }

    fn epoch_mut(&mut self, id: EpochId) -> Result<&mut Epoch> {
        self.epochs
            .get_mut(id.0)
            .ok_or_else(|| Error::NotFound(format!("epoch {}", id.0)))
    }

    /// Add a tag to one epoch. Re-adding a tag is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown handle.
    pub fn add_tag(&mut self, id: EpochId, tag: &str) -> Result<()> {
        self.epoch_mut(id)?.tags.insert(tag.to_string());
        Ok(())
    }

    /// Set a free-text description.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown handle.
    pub fn set_description(&mut self, id: EpochId, description: &str) -> Result<()> {
        self.epoch_mut(id)?.description = Some(description.to_string());
        Ok(())
    }

    /// Epoch behind a handle.
    #[must_use]
    pub fn get(&self, id: EpochId) -> Option<&Epoch> {
        self.epochs.get(id.0)
    }

    /// Epochs created in this session.
    #[must_use]
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Union of the tags of every epoch, stored ones included.
    #[must_use]
    pub fn aggregate_tags(&self) -> BTreeSet<String> {
        self.stored
            .values()
            .flatten()
            .chain(self.epochs.iter().flat_map(|e| e.tags.iter()))
            .cloned()
            .collect()
    }

    /// Write the session's epochs and the aggregate tag set. Does nothing
    /// when no epoch exists at all.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects a write.
    pub fn write<S: ContainerStore>(&self, store: &mut S) -> Result<()> {
        if self.epochs.is_empty() && self.stored.is_empty() {
            return Ok(());
        }
        let root = store.create_node(EPOCHS_PATH)?;
        for epoch in &self.epochs {
            let node = store.create_node(&format!("{EPOCHS_PATH}/{}", epoch.name))?;
            store.write_dataset(node, "start_time", Value::Float(epoch.start))?;
            store.write_dataset(node, "stop_time", Value::Float(epoch.stop))?;
            if let Some(description) = &epoch.description {
                store.write_dataset(node, "description", Value::from(description.as_str()))?;
            }
            store.set_attribute(node, "neurodata_type", Value::from("Epoch"))?;
            store.set_attribute(
                node,
                "tags",
                Value::TextList(epoch.tags.iter().cloned().collect()),
            )?;
        }
        let tags = self.aggregate_tags().into_iter().collect();
        store.set_attribute(root, "tags", Value::TextList(tags))?;
        tracing::debug!("wrote {} epochs", self.epochs.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_invalid_bounds() {
        let mut registry = EpochRegistry::new();
        assert!(matches!(
            registry.create_epoch("e", 3.0, 3.0),
            Err(Error::InvalidRange { .. })
        ));
        assert!(registry.create_epoch("e", 4.0, 3.0).is_err());
        assert!(registry.create_epoch("e", f64::NAN, 3.0).is_err());
        assert!(registry.create_epoch("e", 0.0, 3.0).is_ok());
    }

    #[test]
    fn test_duplicate_name() {
        let mut registry = EpochRegistry::new();
        registry.create_epoch("e", 0.0, 1.0).unwrap();
        assert!(matches!(
            registry.create_epoch("e", 2.0, 3.0),
            Err(Error::InvalidRange { reason, .. }) if reason.contains("already exists")
        ));
    }

    #[test]
    fn test_tags_idempotent() {
        let mut registry = EpochRegistry::new();
        let id = registry.create_epoch("e", 0.0, 1.0).unwrap();
        registry.add_tag(id, "x").unwrap();
        registry.add_tag(id, "x").unwrap();
        assert_eq!(registry.get(id).unwrap().tags().len(), 1);
    }

    #[test]
    fn test_write_and_reload() {
        let mut store = MemoryStore::new();
        let mut registry = EpochRegistry::new();
        let first = registry.create_epoch("epoch-1", 0.0, 3.0).unwrap();
        let _empty = registry.create_epoch("epoch-2", 1.0, 4.0).unwrap();
        registry.add_tag(first, "b").unwrap();
        registry.write(&mut store).unwrap();

        assert_eq!(
            store.attribute_at("epochs/epoch-2", "tags").unwrap(),
            Value::TextList(Vec::new())
        );
        assert_eq!(
            store.attribute_at("epochs", "tags").unwrap(),
            Value::from(vec!["b"])
        );

        let mut reloaded = EpochRegistry::load(&store).unwrap();
        assert!(reloaded.contains("epoch-1"));
        assert!(reloaded.create_epoch("epoch-1", 5.0, 6.0).is_err());
        let third = reloaded.create_epoch("epoch-3", 5.0, 6.0).unwrap();
        reloaded.add_tag(third, "z").unwrap();
        let tags: Vec<String> = reloaded.aggregate_tags().into_iter().collect();
        assert_eq!(tags, vec!["b", "z"]);
    }
}
