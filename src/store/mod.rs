//! Container adapter: the narrow interface to the hierarchical store
//!
//! The engine only ever talks to storage through [`ContainerStore`]. A store
//! holds groups (nodes with named children), datasets (leaf values), and
//! attributes on either. Children may also be hard links (a second name for
//! an existing object) or external links into another container.
//!
//! # Example
//!
//! ```rust
//! use neurodata_db::store::{ContainerStore, MemoryStore, Value};
//!
//! # fn example() -> neurodata_db::Result<()> {
//! let mut store = MemoryStore::new();
//! let node = store.create_node("general/subject")?;
//! store.write_dataset(node, "species", Value::from("mouse"))?;
//! assert!(store.exists("general/subject/species"));
//! # Ok(())
//! # }
//! ```

mod memory;
mod value;

pub use memory::MemoryStore;
pub use value::{NdArray, Value};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Handle to a group or dataset inside one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

/// Longest chain of external links a read will follow.
pub const MAX_LINK_HOPS: usize = 16;

/// Unresolved reference to an object in another container.
///
/// Creating one never touches the target. Resolution happens only when the
/// reader calls [`ExternalLink::resolve`], and fails there if the target
/// container or object is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    container: PathBuf,
    path: String,
}

impl ExternalLink {
    /// Describe a link to `path` inside the container stored at `container`.
    #[must_use]
    pub fn new(container: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            path: path.into(),
        }
    }

    /// Location of the target container.
    #[must_use]
    pub fn container(&self) -> &Path {
        &self.container
    }

    /// Internal path of the target object.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Open the target container and read the linked dataset, following
    /// chained links up to [`MAX_LINK_HOPS`] containers deep.
    ///
    /// # Errors
    ///
    /// Returns `Error::LinkResolution` if a container cannot be loaded, the
    /// target is missing or is itself a group, or the chain loops back on
    /// itself or is too long.
    pub fn resolve(&self) -> Result<Value> {
        let failed = |reason: String| Error::LinkResolution {
            container: self.container.display().to_string(),
            target: self.path.clone(),
            reason,
        };
        let mut visited: Vec<Self> = Vec::new();
        let mut link = self.clone();
        loop {
            if visited.contains(&link) {
                return Err(failed(format!(
                    "link cycle through {}:{}",
                    link.container.display(),
                    link.path
                )));
            }
            if visited.len() == MAX_LINK_HOPS {
                return Err(failed(format!("more than {MAX_LINK_HOPS} chained links")));
            }
            let store = MemoryStore::load(&link.container).map_err(|e| {
                failed(format!("{}: {e}", link.container.display()))
            })?;
            let next = match store.read_path(&link.path).map_err(|e| failed(e.to_string()))? {
                Dataset::Stored(value) => return Ok(value),
                Dataset::External(next) => next,
            };
            visited.push(std::mem::replace(&mut link, next));
        }
    }
}

/// What a dataset read yields: a stored value, or a link still to be followed.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    /// Value held in this container
    Stored(Value),
    /// Value held in another container
    External(ExternalLink),
}

impl Dataset {
    /// Stored value, following an external link when needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::LinkResolution` when an external link cannot be followed.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Self::Stored(value) => Ok(value),
            Self::External(link) => link.resolve(),
        }
    }
}

/// Synchronous hierarchical store consumed by the engine.
///
/// Paths are `/`-separated, relative to the container root, without a
/// leading slash.
pub trait ContainerStore {
    /// Create a group at `path`, creating intermediate groups. Idempotent:
    /// returns the existing group if there is one.
    ///
    /// # Errors
    ///
    /// Returns error if the path is invalid or crosses a dataset.
    fn create_node(&mut self, path: &str) -> Result<NodeId>;

    /// Look up an existing group or dataset.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if nothing exists at `path`.
    fn open_node(&self, path: &str) -> Result<NodeId>;

    /// Write (or overwrite) dataset `field` under group `node`.
    ///
    /// # Errors
    ///
    /// Returns error if `node` is not a group or `field` is invalid.
    fn write_dataset(&mut self, node: NodeId, field: &str, value: Value) -> Result<NodeId>;

    /// Read dataset `field` under group `node`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the dataset does not exist.
    fn read_dataset(&self, node: NodeId, field: &str) -> Result<Dataset>;

    /// Set an attribute on a group or dataset.
    ///
    /// # Errors
    ///
    /// Returns error if `node` is not a valid handle.
    fn set_attribute(&mut self, node: NodeId, key: &str, value: Value) -> Result<()>;

    /// Get an attribute of a group or dataset.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the attribute is absent.
    fn get_attribute(&self, node: NodeId, key: &str) -> Result<Value>;

    /// Make `from` a second name for the object at `to` (hard link).
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if `to` does not exist, `Error::AlreadyExists`
    /// if `from` does.
    fn create_internal_link(&mut self, from: &str, to: &str) -> Result<()>;

    /// Make `from` an external link to `target_path` in another container.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` if `from` exists.
    fn create_external_link(
        &mut self,
        from: &str,
        target_container: &Path,
        target_path: &str,
    ) -> Result<()>;

    /// True if a group, dataset or link exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Names of the children of a group, sorted.
    ///
    /// # Errors
    ///
    /// Returns error if `node` is not a group.
    fn children(&self, node: NodeId) -> Result<Vec<String>>;

    /// Unlink the name at `path`. Other names for the same object stay valid.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if nothing exists at `path`.
    fn remove(&mut self, path: &str) -> Result<()>;
}

/// Split a container path into validated segments.
///
/// # Errors
///
/// Returns `Error::InvalidPath` for empty segments or `.`/`..`.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split('/')
        .map(|seg| {
            if seg.is_empty() || seg == "." || seg == ".." {
                Err(Error::InvalidPath(path.to_string()))
            } else {
                Ok(seg)
            }
        })
        .collect()
}

/// Check that `name` is exactly one path segment.
///
/// # Errors
///
/// Returns `Error::InvalidPath` for empty names, names containing `/`, and
/// `.`/`..`.
pub fn check_segment(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        Err(Error::InvalidPath(name.to_string()))
    } else {
        Ok(())
    }
}

/// Join a parent path and a child name.
#[must_use]
pub fn join_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_matches('/');
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

/// Final segment of a path.
#[must_use]
pub fn leaf_name(path: &str) -> &str {
    path.trim_matches('/').rsplit('/').next().unwrap_or_default()
}
