//! Link resolver: shared dataset storage between entities
//!
//! A link request names a field on a source entity and a field on a target
//! entity. Same-container requests become hard links (both names stay valid
//! independently); requests across containers become external links, resolved
//! only when a reader follows them. Both endpoints get a free-text provenance
//! entry naming the two entities, so the relationship is visible without
//! resolving anything.

use std::path::{Path, PathBuf};

use crate::entity::EntityId;
use crate::schema::LINKABLE_FIELDS;
use crate::store::{join_path, ContainerStore, NodeId, Value};
use crate::{Error, Result};

/// How a link is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Second name for an object in the same container
    Hard,
    /// Path descriptor into another container
    External,
}

impl LinkKind {
    /// Decide the link kind for a source in `source_container` and a target in
    /// `target_container`.
    #[must_use]
    pub fn between(source_container: &Path, target_container: &Path) -> Self {
        if same_container(source_container, target_container) {
            Self::Hard
        } else {
            Self::External
        }
    }
}

fn same_container(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Entity in the same open container
    Local(EntityId),
    /// Object in another container
    External {
        /// Target container location
        container: PathBuf,
        /// Internal path of the target dataset
        path: String,
    },
}

/// One link request, recorded on the source entity until it is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    source_name: String,
    source_field: String,
    target_name: String,
    target_field: String,
    target: LinkTarget,
}

impl LinkRecord {
    /// Build a record after checking that the two fields may be linked.
    ///
    /// # Errors
    ///
    /// Returns `Error::CrossPlacementLink` if the fields differ in meaning.
    pub fn new(
        source_name: impl Into<String>,
        source_field: &str,
        target_name: impl Into<String>,
        target_field: &str,
        target: LinkTarget,
    ) -> Result<Self> {
        check_fields(source_field, target_field)?;
        Ok(Self {
            source_name: source_name.into(),
            source_field: source_field.to_string(),
            target_name: target_name.into(),
            target_field: target_field.to_string(),
            target,
        })
    }

    /// Name of the linking entity.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Linked field on the source.
    #[must_use]
    pub fn source_field(&self) -> &str {
        &self.source_field
    }

    /// Name of the entity that owns the data.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Field on the target.
    #[must_use]
    pub fn target_field(&self) -> &str {
        &self.target_field
    }

    /// Link destination.
    #[must_use]
    pub const fn target(&self) -> &LinkTarget {
        &self.target
    }

    /// Storage kind implied by the destination.
    #[must_use]
    pub const fn kind(&self) -> LinkKind {
        match self.target {
            LinkTarget::Local(_) => LinkKind::Hard,
            LinkTarget::External { .. } => LinkKind::External,
        }
    }

    /// Attribute key the provenance entry is stored under.
    #[must_use]
    pub fn provenance_key(&self) -> &'static str {
        provenance_key(&self.source_field)
    }

    /// Human-readable provenance entry naming both entities.
    #[must_use]
    pub fn provenance(&self) -> String {
        match &self.target {
            LinkTarget::Local(_) => format!(
                "'{}' {} is a hard link to '{}' {}",
                self.source_name, self.source_field, self.target_name, self.target_field
            ),
            LinkTarget::External { container, path } => format!(
                "'{}' {} is an external link to '{}' {} ({}:{})",
                self.source_name,
                self.source_field,
                self.target_name,
                self.target_field,
                container.display(),
                path
            ),
        }
    }

    /// Create the link at `source_path` through the adapter. For local
    /// targets `local_target_path` is the target dataset's current path.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if a local target has not been materialized.
    pub(crate) fn materialize<S: ContainerStore>(
        &self,
        store: &mut S,
        source_path: &str,
        local_target_path: Option<&str>,
    ) -> Result<()> {
        let from = join_path(source_path, &self.source_field);
        match (&self.target, local_target_path) {
            (LinkTarget::Local(_), Some(to)) => {
                if !store.exists(to) {
                    return Err(Error::NotFound(format!(
                        "{to} (finalize '{}' before '{}')",
                        self.target_name, self.source_name
                    )));
                }
                store.create_internal_link(&from, to)
            }
            (LinkTarget::Local(_), None) => Err(Error::NotFound(format!(
                "link target '{}'",
                self.target_name
            ))),
            (LinkTarget::External { container, path }, _) => {
                store.create_external_link(&from, container, path)
            }
        }
    }
}

/// Attribute key for link provenance on `field`.
#[must_use]
pub fn provenance_key(field: &str) -> &'static str {
    if field == "timestamps" {
        "timestamp_link"
    } else {
        "data_link"
    }
}

/// Check that `source_field` may be linked to `target_field`.
///
/// # Errors
///
/// Returns `Error::CrossPlacementLink` unless both name the same linkable field.
pub fn check_fields(source_field: &str, target_field: &str) -> Result<()> {
    let forbid = |reason: &str| Error::CrossPlacementLink {
        source_field: source_field.to_string(),
        target_field: target_field.to_string(),
        reason: reason.to_string(),
    };
    if !LINKABLE_FIELDS.contains(&source_field) || !LINKABLE_FIELDS.contains(&target_field) {
        return Err(forbid("only data and timestamps can be linked"));
    }
    if source_field != target_field {
        return Err(forbid("linked fields must have the same meaning"));
    }
    Ok(())
}

/// Append a provenance entry to a text-list attribute, skipping duplicates.
///
/// # Errors
///
/// Returns error if the attribute exists with a non-text type or the node is
/// invalid.
pub(crate) fn append_provenance<S: ContainerStore>(
    store: &mut S,
    node: NodeId,
    key: &str,
    entry: &str,
) -> Result<()> {
    let mut entries = match store.get_attribute(node, key) {
        Ok(Value::TextList(entries)) => entries,
        Ok(Value::Text(single)) => vec![single],
        Ok(other) => {
            return Err(Error::TypeMismatch {
                expected: "text list".to_string(),
                found: format!("{other:?}"),
            })
        }
        Err(Error::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e),
    };
    if !entries.iter().any(|e| e == entry) {
        entries.push(entry.to_string());
    }
    store.set_attribute(node, key, Value::TextList(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_check_fields() {
        assert!(check_fields("data", "data").is_ok());
        assert!(check_fields("timestamps", "timestamps").is_ok());
        assert!(matches!(
            check_fields("data", "timestamps"),
            Err(Error::CrossPlacementLink { .. })
        ));
        assert!(matches!(
            check_fields("comment", "comment"),
            Err(Error::CrossPlacementLink { .. })
        ));
    }

    #[test]
    fn test_kind_between() {
        assert_eq!(
            LinkKind::between(Path::new("a.json"), Path::new("a.json")),
            LinkKind::Hard
        );
        assert_eq!(
            LinkKind::between(Path::new("a.json"), Path::new("b.json")),
            LinkKind::External
        );
    }

    #[test]
    fn test_provenance_names_both() {
        let record = LinkRecord::new("root2", "data", "root1", "data", LinkTarget::Local(EntityId(0)))
            .unwrap();
        let text = record.provenance();
        assert!(text.contains("root1"));
        assert!(text.contains("root2"));
        assert_eq!(record.provenance_key(), "data_link");
        assert_eq!(record.kind(), LinkKind::Hard);
    }

    #[test]
    fn test_append_provenance_dedups() {
        let mut store = MemoryStore::new();
        let node = store.create_node("a").unwrap();
        append_provenance(&mut store, node, "data_link", "x").unwrap();
        append_provenance(&mut store, node, "data_link", "y").unwrap();
        append_provenance(&mut store, node, "data_link", "x").unwrap();
        assert_eq!(
            store.get_attribute(node, "data_link").unwrap(),
            Value::from(vec!["x", "y"])
        );
    }

    #[test]
    fn test_materialize_missing_local_target() {
        let mut store = MemoryStore::new();
        let record = LinkRecord::new("b", "data", "a", "data", LinkTarget::Local(EntityId(0))).unwrap();
        let err = record
            .materialize(&mut store, "acquisition/timeseries/b", Some("acquisition/timeseries/a/data"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
