//! In-memory arena store with JSON persistence.
//!
//! Objects live in a flat `Vec`; groups map child names to arena slots. A hard
//! link is just a second child entry pointing at the same slot, so unlinking
//! one name never invalidates the other. A path-to-slot index (FxHash) serves
//! lookups without walking the tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{join_path, leaf_name, split_path, ContainerStore, Dataset, ExternalLink, NodeId, Value};
use crate::{Error, Result};

const ROOT: NodeId = NodeId(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Child {
    Object(NodeId),
    External(ExternalLink),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum NodeKind {
    Group { children: BTreeMap<String, Child> },
    Dataset { value: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    kind: NodeKind,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

impl Node {
    fn group() -> Self {
        Self {
            kind: NodeKind::Group {
                children: BTreeMap::new(),
            },
            attributes: BTreeMap::new(),
        }
    }

    fn dataset(value: Value) -> Self {
        Self {
            kind: NodeKind::Dataset { value },
            attributes: BTreeMap::new(),
        }
    }
}

/// Arena-backed implementation of [`ContainerStore`].
///
/// # Example
///
/// ```rust
/// use neurodata_db::store::{ContainerStore, MemoryStore, Value};
///
/// # fn example() -> neurodata_db::Result<()> {
/// let mut store = MemoryStore::new();
/// let ts = store.create_node("acquisition/timeseries/a")?;
/// store.write_dataset(ts, "data", Value::from(vec![1.0]))?;
/// store.create_internal_link("acquisition/timeseries/b_data", "acquisition/timeseries/a/data")?;
///
/// // Unlinking the original name leaves the second name intact
/// store.remove("acquisition/timeseries/a/data")?;
/// assert!(store.exists("acquisition/timeseries/b_data"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStore {
    nodes: Vec<Node>,
    #[serde(skip)]
    index: FxHashMap<String, NodeId>,
    #[serde(skip)]
    aliases: FxHashMap<NodeId, Vec<String>>,
}

impl MemoryStore {
    /// Create an empty store holding only the root group.
    #[must_use]
    pub fn new() -> Self {
        let mut store = Self {
            nodes: vec![Node::group()],
            index: FxHashMap::default(),
            aliases: FxHashMap::default(),
        };
        store.register(String::new(), ROOT);
        store
    }

    /// Number of arena slots (including unlinked ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root group exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Load a store previously written with [`MemoryStore::save`].
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let mut store: Self = serde_json::from_slice(&bytes)?;
        if store.nodes.is_empty() {
            return Err(Error::InvalidPath(format!(
                "{}: container has no root group",
                path.as_ref().display()
            )));
        }
        store.rebuild_index();
        Ok(store)
    }

    /// Persist the store to `path`. Slots no name reaches any more are
    /// dropped. The document is written to a sibling temporary file first
    /// and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or any file operation fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let bytes = serde_json::to_vec(&self.compacted())?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read the dataset at a full path.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if there is no dataset at `path`.
    pub fn read_path(&self, path: &str) -> Result<Dataset> {
        let parent = parent_path(path);
        let node = self.open_node(&parent)?;
        self.read_dataset(node, leaf_name(path))
    }

    /// Get an attribute of the object at a full path.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the object or attribute is absent.
    pub fn attribute_at(&self, path: &str, key: &str) -> Result<Value> {
        let node = self.open_node(path)?;
        self.get_attribute(node, key)
    }

    /// Copy holding only the slots reachable from the root, renumbered in
    /// breadth-first order. Hard links keep sharing one slot.
    fn compacted(&self) -> Self {
        let mut remap: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        remap.insert(ROOT, ROOT);
        let mut order = vec![ROOT];
        let mut next = 0;
        while let Some(&id) = order.get(next) {
            if let NodeKind::Group { children } = &self.nodes[id.0].kind {
                for child in children.values() {
                    if let Child::Object(cid) = child {
                        if !remap.contains_key(cid) {
                            remap.insert(*cid, NodeId(order.len()));
                            order.push(*cid);
                        }
                    }
                }
            }
            next += 1;
        }
        let nodes = order
            .iter()
            .map(|id| {
                let mut node = self.nodes[id.0].clone();
                if let NodeKind::Group { children } = &mut node.kind {
                    for child in children.values_mut() {
                        if let Child::Object(cid) = child {
                            if let Some(&moved) = remap.get(cid) {
                                *cid = moved;
                            }
                        }
                    }
                }
                node
            })
            .collect();
        Self {
            nodes,
            index: FxHashMap::default(),
            aliases: FxHashMap::default(),
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        self.aliases.clear();
        self.register(String::new(), ROOT);
        self.index_subtree("", ROOT);
    }

    fn register(&mut self, path: String, id: NodeId) {
        self.aliases.entry(id).or_default().push(path.clone());
        self.index.insert(path, id);
    }

    fn unregister_prefix(&mut self, path: &str) {
        let prefix = format!("{path}/");
        let doomed: Vec<String> = self
            .index
            .keys()
            .filter(|k| *k == path || k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in doomed {
            if let Some(id) = self.index.remove(&key) {
                if let Some(names) = self.aliases.get_mut(&id) {
                    names.retain(|n| *n != key);
                }
            }
        }
    }

    fn index_subtree(&mut self, path: &str, id: NodeId) {
        let children: Vec<(String, NodeId)> = match &self.nodes[id.0].kind {
            NodeKind::Group { children } => children
                .iter()
                .filter_map(|(name, child)| match child {
                    Child::Object(cid) => Some((name.clone(), *cid)),
                    Child::External(_) => None,
                })
                .collect(),
            NodeKind::Dataset { .. } => Vec::new(),
        };
        for (name, cid) in children {
            let child_path = join_path(path, &name);
            self.register(child_path.clone(), cid);
            self.index_subtree(&child_path, cid);
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::NotFound(format!("node #{}", id.0)))
    }

    fn children_mut(&mut self, id: NodeId) -> Result<&mut BTreeMap<String, Child>> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::NotFound(format!("node #{}", id.0)))?;
        match &mut node.kind {
            NodeKind::Group { children } => Ok(children),
            NodeKind::Dataset { .. } => Err(Error::TypeMismatch {
                expected: "group".to_string(),
                found: "dataset".to_string(),
            }),
        }
    }

    fn child_at(&self, path: &str) -> Option<&Child> {
        let parent = self.index.get(&parent_path(path))?;
        match &self.nodes[parent.0].kind {
            NodeKind::Group { children } => children.get(leaf_name(path)),
            NodeKind::Dataset { .. } => None,
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn insert_child(&mut self, parent: NodeId, name: &str, child: Child) -> Result<()> {
        let parents = self.aliases.get(&parent).cloned().unwrap_or_default();
        let object = match &child {
            Child::Object(id) => Some(*id),
            Child::External(_) => None,
        };
        self.children_mut(parent)?.insert(name.to_string(), child);
        if let Some(id) = object {
            for parent_path in parents {
                let path = join_path(&parent_path, name);
                self.register(path.clone(), id);
                self.index_subtree(&path, id);
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerStore for MemoryStore {
    fn create_node(&mut self, path: &str) -> Result<NodeId> {
        let mut current = ROOT;
        let mut built = String::new();
        for segment in split_path(path)? {
            built = join_path(&built, segment);
            if let Some(&existing) = self.index.get(&built) {
                if matches!(self.nodes[existing.0].kind, NodeKind::Dataset { .. }) {
                    return Err(Error::AlreadyExists(format!("{built} (dataset)")));
                }
                current = existing;
                continue;
            }
            if self.child_at(&built).is_some() {
                return Err(Error::AlreadyExists(format!("{built} (external link)")));
            }
            let id = self.push(Node::group());
            self.insert_child(current, segment, Child::Object(id))?;
            current = id;
        }
        Ok(current)
    }

    fn open_node(&self, path: &str) -> Result<NodeId> {
        let key = split_path(path)?.join("/");
        self.index
            .get(&key)
            .copied()
            .ok_or_else(|| Error::NotFound(key))
    }

    fn write_dataset(&mut self, node: NodeId, field: &str, value: Value) -> Result<NodeId> {
        if split_path(field)?.len() != 1 {
            return Err(Error::InvalidPath(field.to_string()));
        }
        let existing = match &self.node(node)?.kind {
            NodeKind::Group { children } => children.get(field).cloned(),
            NodeKind::Dataset { .. } => {
                return Err(Error::TypeMismatch {
                    expected: "group".to_string(),
                    found: "dataset".to_string(),
                })
            }
        };
        if let Some(Child::Object(old)) = existing {
            if matches!(self.nodes[old.0].kind, NodeKind::Group { .. }) {
                return Err(Error::AlreadyExists(format!("{field} (group)")));
            }
            for parent_path in self.aliases.get(&node).cloned().unwrap_or_default() {
                self.unregister_prefix(&join_path(&parent_path, field));
            }
        }
        let id = self.push(Node::dataset(value));
        self.insert_child(node, field, Child::Object(id))?;
        Ok(id)
    }

    fn read_dataset(&self, node: NodeId, field: &str) -> Result<Dataset> {
        let NodeKind::Group { children } = &self.node(node)?.kind else {
            return Err(Error::NotFound(field.to_string()));
        };
        match children.get(field) {
            Some(Child::Object(id)) => match &self.nodes[id.0].kind {
                NodeKind::Dataset { value } => Ok(Dataset::Stored(value.clone())),
                NodeKind::Group { .. } => Err(Error::TypeMismatch {
                    expected: "dataset".to_string(),
                    found: "group".to_string(),
                }),
            },
            Some(Child::External(link)) => Ok(Dataset::External(link.clone())),
            None => Err(Error::NotFound(field.to_string())),
        }
    }

    fn set_attribute(&mut self, node: NodeId, key: &str, value: Value) -> Result<()> {
        let node = self
            .nodes
            .get_mut(node.0)
            .ok_or_else(|| Error::NotFound(format!("node #{}", node.0)))?;
        node.attributes.insert(key.to_string(), value);
        Ok(())
    }

    fn get_attribute(&self, node: NodeId, key: &str) -> Result<Value> {
        self.node(node)?
            .attributes
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("attribute '{key}'")))
    }

    fn create_internal_link(&mut self, from: &str, to: &str) -> Result<()> {
        let target = self.open_node(to)?;
        let from_key = split_path(from)?.join("/");
        let to_key = split_path(to)?.join("/");
        if from_key.is_empty() || to_key.is_empty() || from_key.starts_with(&format!("{to_key}/")) {
            return Err(Error::InvalidPath(from.to_string()));
        }
        if self.exists(&from_key) {
            return Err(Error::AlreadyExists(from_key));
        }
        let parent = self.create_node(&parent_path(&from_key))?;
        self.insert_child(parent, leaf_name(&from_key), Child::Object(target))
    }

    fn create_external_link(
        &mut self,
        from: &str,
        target_container: &Path,
        target_path: &str,
    ) -> Result<()> {
        let from_key = split_path(from)?.join("/");
        if from_key.is_empty() {
            return Err(Error::InvalidPath(from.to_string()));
        }
        if self.exists(&from_key) {
            return Err(Error::AlreadyExists(from_key));
        }
        let parent = self.create_node(&parent_path(&from_key))?;
        let link = ExternalLink::new(target_container, split_path(target_path)?.join("/"));
        self.insert_child(parent, leaf_name(&from_key), Child::External(link))
    }

    fn exists(&self, path: &str) -> bool {
        let Ok(segments) = split_path(path) else {
            return false;
        };
        let key = segments.join("/");
        self.index.contains_key(&key) || self.child_at(&key).is_some()
    }

    fn children(&self, node: NodeId) -> Result<Vec<String>> {
        match &self.node(node)?.kind {
            NodeKind::Group { children } => Ok(children.keys().cloned().collect()),
            NodeKind::Dataset { .. } => Err(Error::TypeMismatch {
                expected: "group".to_string(),
                found: "dataset".to_string(),
            }),
        }
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        let key = split_path(path)?.join("/");
        if key.is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        let parent = self.open_node(&parent_path(&key))?;
        let parents = self.aliases.get(&parent).cloned().unwrap_or_default();
        if self.children_mut(parent)?.remove(leaf_name(&key)).is_none() {
            return Err(Error::NotFound(key));
        }
        for parent_path in parents {
            self.unregister_prefix(&join_path(&parent_path, leaf_name(&key)));
        }
        Ok(())
    }
}

fn parent_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    trimmed
        .rsplit_once('/')
        .map_or_else(String::new, |(parent, _)| parent.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_node_idempotent() {
        let mut store = MemoryStore::new();
        let a = store.create_node("general/devices").unwrap();
        let b = store.create_node("general/devices").unwrap();
        assert_eq!(a, b);
        assert!(store.exists("general"));
        assert_eq!(store.open_node("general/devices").unwrap(), a);
    }

    #[test]
    fn test_open_missing_node() {
        let store = MemoryStore::new();
        assert!(matches!(store.open_node("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_dataset_write_read() {
        let mut store = MemoryStore::new();
        let node = store.create_node("g").unwrap();
        store.write_dataset(node, "x", Value::Int(3)).unwrap();
        assert_eq!(
            store.read_dataset(node, "x").unwrap(),
            Dataset::Stored(Value::Int(3))
        );
        assert!(matches!(
            store.read_dataset(node, "y"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_cannot_create_node_through_dataset() {
        let mut store = MemoryStore::new();
        let node = store.create_node("g").unwrap();
        store.write_dataset(node, "x", Value::Int(3)).unwrap();
        assert!(store.create_node("g/x/y").is_err());
    }

    #[test]
    fn test_attributes() {
        let mut store = MemoryStore::new();
        let node = store.create_node("g").unwrap();
        store.set_attribute(node, "tags", Value::from(vec!["a"])).unwrap();
        assert_eq!(
            store.get_attribute(node, "tags").unwrap(),
            Value::from(vec!["a"])
        );
        assert!(store.get_attribute(node, "missing").is_err());
    }

    #[test]
    fn test_hard_link_survives_unlink() {
        let mut store = MemoryStore::new();
        let a = store.create_node("a").unwrap();
        store.write_dataset(a, "data", Value::from(vec![1.0])).unwrap();
        store.create_internal_link("b/data", "a/data").unwrap();
        store.remove("a/data").unwrap();
        assert!(!store.exists("a/data"));
        assert_eq!(
            store.read_path("b/data").unwrap(),
            Dataset::Stored(Value::from(vec![1.0]))
        );
    }

    #[test]
    fn test_hard_link_to_group_indexes_subtree() {
        let mut store = MemoryStore::new();
        let ts = store.create_node("acquisition/timeseries/ts").unwrap();
        store.write_dataset(ts, "data", Value::Int(1)).unwrap();
        store
            .create_internal_link("processing/m/i/ts", "acquisition/timeseries/ts")
            .unwrap();
        assert!(store.exists("processing/m/i/ts/data"));

        // Writes through one name are visible through the other
        let linked = store.open_node("processing/m/i/ts").unwrap();
        store.write_dataset(linked, "extra", Value::Int(2)).unwrap();
        assert!(store.exists("acquisition/timeseries/ts/extra"));
    }

    #[test]
    fn test_link_into_own_subtree_rejected() {
        let mut store = MemoryStore::new();
        store.create_node("a").unwrap();
        assert!(store.create_internal_link("a/self", "a").is_err());
    }

    #[test]
    fn test_external_link_is_unresolved() {
        let mut store = MemoryStore::new();
        store
            .create_external_link("x/data", Path::new("other.json"), "a/data")
            .unwrap();
        assert!(store.exists("x/data"));
        match store.read_path("x/data").unwrap() {
            Dataset::External(link) => {
                assert_eq!(link.path(), "a/data");
                assert_eq!(link.container(), Path::new("other.json"));
            }
            Dataset::Stored(_) => panic!("expected external link"),
        }
    }

    #[test]
    fn test_children_sorted() {
        let mut store = MemoryStore::new();
        store.create_node("epochs/b").unwrap();
        store.create_node("epochs/a").unwrap();
        let epochs = store.open_node("epochs").unwrap();
        assert_eq!(store.children(epochs).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_save_drops_unreachable_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let mut store = MemoryStore::new();
        let node = store.create_node("g").unwrap();
        for i in 0..5 {
            store.write_dataset(node, "x", Value::Int(i)).unwrap();
        }
        store.write_dataset(node, "shared", Value::Int(9)).unwrap();
        store.create_internal_link("h/alias", "g/shared").unwrap();
        let doomed = store.create_node("gone/deep").unwrap();
        store.write_dataset(doomed, "y", Value::Int(1)).unwrap();
        store.remove("gone").unwrap();
        assert_eq!(store.len(), 12);
        store.save(&path).unwrap();

        // root, g, x, shared, h
        let loaded = MemoryStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded.read_path("g/x").unwrap(), Dataset::Stored(Value::Int(4)));
        assert_eq!(
            loaded.open_node("g/shared").unwrap(),
            loaded.open_node("h/alias").unwrap()
        );
        assert!(!loaded.exists("gone"));
    }

    #[test]
    fn test_save_load_rebuilds_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let mut store = MemoryStore::new();
        let node = store.create_node("general").unwrap();
        store.write_dataset(node, "lab", Value::from("L")).unwrap();
        store.create_internal_link("alias", "general").unwrap();
        store.save(&path).unwrap();

        let loaded = MemoryStore::load(&path).unwrap();
        assert!(loaded.exists("general/lab"));
        assert!(loaded.exists("alias/lab"));
        assert_eq!(
            loaded.read_path("alias/lab").unwrap(),
            Dataset::Stored(Value::from("L"))
        );
    }

    #[test]
    fn test_remove_root_rejected() {
        let mut store = MemoryStore::new();
        assert!(store.remove("").is_err());
        assert!(store.remove("missing").is_err());
    }
}
