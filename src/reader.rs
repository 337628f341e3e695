//! Read-only access to a closed container
//!
//! Opening a container for reading never touches its modification log.
//! External links come back as [`Dataset::External`] until the caller asks
//! for the value, so a missing target container only surfaces as
//! `Error::LinkResolution` at that point.
//!
//! ## Example
//!
//! ```rust,no_run
//! use neurodata_db::reader::ContainerReader;
//!
//! # fn example() -> neurodata_db::Result<()> {
//! let reader = ContainerReader::open("session.nwb.json")?;
//! let path = "acquisition/timeseries/annot";
//! reader.verify_entity(path, "AnnotationSeries")?;
//! assert!(reader.is_a(path, "TimeSeries")?);
//! println!("opened {} times", reader.modification_log()?.len());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::container::ModificationLog;
use crate::epoch::EPOCHS_PATH;
use crate::schema::TypeRegistry;
use crate::store::{join_path, ContainerStore, Dataset, MemoryStore, Value};
use crate::{Error, Result};

/// Read-only view of a stored container.
#[derive(Debug)]
pub struct ContainerReader {
    path: PathBuf,
    store: MemoryStore,
    registry: Arc<TypeRegistry>,
}

fn text_list(value: Value) -> Result<Vec<String>> {
    match value {
        Value::TextList(items) => Ok(items),
        Value::Text(single) => Ok(vec![single]),
        other => Err(Error::TypeMismatch {
            expected: "text list".to_string(),
            found: format!("{other:?}"),
        }),
    }
}

impl ContainerReader {
    /// Load the container stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if nothing is stored there and
    /// `Error::Serialization` if the document is not a container.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let store = MemoryStore::load(path)?;
        tracing::debug!("opened {} read-only", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            store,
            registry: TypeRegistry::global(),
        })
    }

    /// Use `registry` for [`ContainerReader::verify_entity`].
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Container location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying store.
    #[must_use]
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// True if a group or dataset exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.store.exists(path)
    }

    /// Dataset at `path`, without following external links.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for a missing dataset.
    pub fn raw_dataset(&self, path: &str) -> Result<Dataset> {
        self.store.read_path(path)
    }

    /// Dataset value at `path`, following external links.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for a missing dataset and
    /// `Error::LinkResolution` if an external link cannot be followed.
    pub fn dataset(&self, path: &str) -> Result<Value> {
        self.raw_dataset(path)?.into_value()
    }

    /// Attribute `key` of the group or dataset at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the object or attribute is missing.
    pub fn attribute(&self, path: &str, key: &str) -> Result<Value> {
        self.store.attribute_at(path, key)
    }

    /// Stored ancestry of the entity at `path`, root type first.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the entity or its ancestry is missing.
    pub fn ancestry(&self, path: &str) -> Result<Vec<String>> {
        text_list(self.attribute(path, "ancestry")?)
    }

    /// True if `type_name` appears in the stored ancestry.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the entity has no ancestry.
    pub fn is_a(&self, path: &str, type_name: &str) -> Result<bool> {
        Ok(self.ancestry(path)?.iter().any(|t| t == type_name))
    }

    /// Modification log, oldest entry first.
    ///
    /// # Errors
    ///
    /// Returns error if the stored log is malformed.
    pub fn modification_log(&self) -> Result<ModificationLog> {
        ModificationLog::load(&self.store)
    }

    /// Tags of one epoch.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown epoch.
    pub fn epoch_tags(&self, epoch: &str) -> Result<BTreeSet<String>> {
        let path = join_path(EPOCHS_PATH, epoch);
        Ok(text_list(self.attribute(&path, "tags")?)?.into_iter().collect())
    }

    /// Aggregate tag set of all epochs; empty when no epoch was stored.
    ///
    /// # Errors
    ///
    /// Returns error if the stored tag attribute is malformed.
    pub fn aggregate_tags(&self) -> Result<BTreeSet<String>> {
        match self.attribute(EPOCHS_PATH, "tags") {
            Ok(value) => Ok(text_list(value)?.into_iter().collect()),
            Err(Error::NotFound(_)) => Ok(BTreeSet::new()),
            Err(e) => Err(e),
        }
    }

    /// Check a stored entity against the contract of `type_name`: its
    /// `neurodata_type` and ancestry match, every required field is present,
    /// and every optional field is present, recorded in `missing_fields`, or
    /// covered by its alternative.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedEntity` describing the first violation and
    /// `Error::UnknownType` for an unregistered type.
    pub fn verify_entity(&self, path: &str, type_name: &str) -> Result<()> {
        let ty = self.registry.resolve(type_name)?;
        let malformed = |reason: String| Error::MalformedEntity {
            path: path.to_string(),
            reason,
        };

        match self.attribute(path, "neurodata_type") {
            Ok(Value::Text(found)) if found == ty.family() => {}
            Ok(other) => {
                return Err(malformed(format!(
                    "neurodata_type is {other:?}, expected '{}'",
                    ty.family()
                )))
            }
            Err(_) => return Err(malformed("no neurodata_type attribute".to_string())),
        }
        let ancestry = self
            .ancestry(path)
            .map_err(|e| malformed(format!("unreadable ancestry: {e}")))?;
        if !ancestry.iter().any(|t| t == type_name) {
            return Err(malformed(format!("ancestry {ancestry:?} lacks '{type_name}'")));
        }

        let present = |field: &str| self.exists(&join_path(path, field));
        if let Some(field) = ty.required().find(|f| !present(*f)) {
            return Err(malformed(format!("required field '{field}' is absent")));
        }
        let missing = match self.attribute(path, "missing_fields") {
            Ok(value) => text_list(value)?,
            Err(Error::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let unaccounted = ty.optional().find(|f| {
            !present(*f)
                && !missing.iter().any(|m| m == f)
                && !ty.alternative(f).is_some_and(|alt| present(alt))
        });
        if let Some(field) = unaccounted {
            return Err(malformed(format!(
                "optional field '{field}' is neither present nor listed as missing"
            )));
        }
        Ok(())
    }
}
