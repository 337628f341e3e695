//! Series-group interfaces: typed series placed or linked under the interface

use crate::entity::EntityId;
use crate::schema::EntityType;
use crate::store::{join_path, ContainerStore, NodeId, Value};
use crate::{Error, Result};

use super::{InterfaceData, InterfaceKind};

/// How a series belongs to the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    /// Series created in (moved into) the interface
    Owned(EntityId),
    /// Hard link to a series finalized elsewhere; holds the target path
    Linked(String),
}

/// Series collected by one series-group interface.
#[derive(Debug, Clone)]
pub struct SeriesGroup {
    kind: InterfaceKind,
    members: Vec<(String, Member)>,
}

impl SeriesGroup {
    pub(crate) const fn new(kind: InterfaceKind) -> Self {
        Self {
            kind,
            members: Vec::new(),
        }
    }

    /// Series in insertion order.
    #[must_use]
    pub fn members(&self) -> &[(String, Member)] {
        &self.members
    }

    /// Check that `ty` is acceptable and `name` is free.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` if the interface does not accept the
    /// type and `Error::AlreadyExists` if the name is taken.
    pub(crate) fn admit(&self, name: &str, ty: &EntityType) -> Result<()> {
        let expected = self.kind.accepts().unwrap_or("TimeSeries");
        if !ty.is_a(expected) {
            return Err(Error::TypeMismatch {
                expected: expected.to_string(),
                found: ty.name().to_string(),
            });
        }
        if self.members.iter().any(|(n, _)| n == name) {
            return Err(Error::AlreadyExists(format!("{}/{name}", self.kind)));
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, name: &str, member: Member) {
        self.members.push((name.to_string(), member));
    }
}

impl InterfaceData for SeriesGroup {
    fn validate(&self, _interface: &str) -> Result<()> {
        Ok(())
    }

    fn write<S: ContainerStore>(&self, store: &mut S, path: &str, node: NodeId) -> Result<()> {
        for (name, member) in &self.members {
            if let Member::Linked(target) = member {
                store.create_internal_link(&join_path(path, name), target)?;
            }
        }
        let names = self.members.iter().map(|(n, _)| n.clone()).collect();
        store.set_attribute(node, "timeseries", Value::TextList(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeRegistry;
    use crate::store::MemoryStore;

    #[test]
    fn test_admit_checks_family() {
        let registry = TypeRegistry::standard();
        let group = SeriesGroup::new(InterfaceKind::Lfp);
        assert!(matches!(
            group.admit("x", &registry.resolve("TimeSeries").unwrap()),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(group
            .admit("x", &registry.resolve("ElectricalSeries").unwrap())
            .is_ok());
    }

    #[test]
    fn test_admit_rejects_duplicate_name() {
        let registry = TypeRegistry::standard();
        let mut group = SeriesGroup::new(InterfaceKind::BehavioralEvents);
        group.push("x", Member::Owned(EntityId(0)));
        assert!(matches!(
            group.admit("x", &registry.resolve("AnnotationSeries").unwrap()),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_write_links_members() {
        let mut store = MemoryStore::new();
        let target = store.create_node("acquisition/timeseries/ts").unwrap();
        store.write_dataset(target, "data", Value::from(vec![1.0])).unwrap();
        let mut group = SeriesGroup::new(InterfaceKind::BehavioralTimeSeries);
        group.push("ts", Member::Linked("acquisition/timeseries/ts".to_string()));
        let path = "processing/m/BehavioralTimeSeries";
        let node = store.create_node(path).unwrap();
        group.write(&mut store, path, node).unwrap();
        assert!(store.exists("processing/m/BehavioralTimeSeries/ts/data"));
    }
}
