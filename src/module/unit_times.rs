//! `UnitTimes`: spike times per sorted unit

use crate::store::{check_segment, join_path, ContainerStore, NodeId, Value};
use crate::{Error, Result};

use super::InterfaceData;

/// Dataset listing the unit names.
pub const UNIT_LIST: &str = "unit_list";

#[derive(Debug, Clone, PartialEq)]
struct Unit {
    name: String,
    times: Vec<f64>,
    description: String,
    source: String,
}

/// Event-time lists keyed by unit name.
#[derive(Debug, Clone, Default)]
pub struct UnitTimes {
    units: Vec<Unit>,
}

impl UnitTimes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add one unit's spike times.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` for a repeated unit name and
    /// `Error::InvalidRecord` for a reserved name or non-finite or
    /// decreasing times.
    pub fn add_unit(
        &mut self,
        name: &str,
        times: &[f64],
        description: &str,
        source: &str,
    ) -> Result<()> {
        check_segment(name)?;
        if self.units.iter().any(|u| u.name == name) {
            return Err(Error::AlreadyExists(format!("UnitTimes/{name}")));
        }
        let invalid = |reason: String| Error::InvalidRecord {
            interface: "UnitTimes".to_string(),
            reason,
        };
        if name == UNIT_LIST {
            return Err(invalid(format!("'{UNIT_LIST}' is reserved for the unit index")));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(invalid(format!("unit '{name}' has non-finite spike times")));
        }
        if times.windows(2).any(|w| w[1] < w[0]) {
            return Err(invalid(format!("unit '{name}' spike times are not sorted")));
        }
        self.units.push(Unit {
            name: name.to_string(),
            times: times.to_vec(),
            description: description.to_string(),
            source: source.to_string(),
        });
        Ok(())
    }

    /// Unit names in insertion order.
    #[must_use]
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }
}

impl InterfaceData for UnitTimes {
    fn validate(&self, interface: &str) -> Result<()> {
        if self.units.is_empty() {
            return Err(Error::InvalidRecord {
                interface: interface.to_string(),
                reason: "no units were added".to_string(),
            });
        }
        Ok(())
    }

    fn write<S: ContainerStore>(&self, store: &mut S, path: &str, node: NodeId) -> Result<()> {
        for unit in &self.units {
            let group = store.create_node(&join_path(path, &unit.name))?;
            store.write_dataset(group, "times", Value::FloatList(unit.times.clone()))?;
            store.write_dataset(group, "unit_description", Value::from(unit.description.as_str()))?;
            store.write_dataset(group, "source", Value::from(unit.source.as_str()))?;
        }
        let names = self.units.iter().map(|u| u.name.clone()).collect();
        store.write_dataset(node, UNIT_LIST, Value::TextList(names))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_add_unit_validation() {
        let mut units = UnitTimes::new();
        units.add_unit("unit-0", &[0.1, 0.2], "d", "s").unwrap();
        assert!(matches!(
            units.add_unit("unit-0", &[0.3], "d", "s"),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            units.add_unit("unit-1", &[0.3, 0.1], "d", "s"),
            Err(Error::InvalidRecord { .. })
        ));
        assert!(units.add_unit("unit-2", &[f64::NAN], "d", "s").is_err());
        assert!(matches!(
            units.add_unit(UNIT_LIST, &[0.3], "d", "s"),
            Err(Error::InvalidRecord { reason, .. }) if reason.contains("reserved")
        ));
        assert_eq!(units.unit_names(), vec!["unit-0"]);
    }

    #[test]
    fn test_empty_rejected() {
        assert!(UnitTimes::new().validate("UnitTimes").is_err());
    }

    #[test]
    fn test_write_layout() {
        let mut store = MemoryStore::new();
        let mut units = UnitTimes::new();
        units.add_unit("unit-0", &[0.5, 1.5], "<description of unit>", "sorter").unwrap();
        let path = "processing/spikes/UnitTimes";
        let node = store.create_node(path).unwrap();
        units.write(&mut store, path, node).unwrap();
        assert_eq!(
            store
                .read_path("processing/spikes/UnitTimes/unit-0/times")
                .unwrap()
                .into_value()
                .unwrap(),
            Value::from(vec![0.5, 1.5])
        );
        assert_eq!(
            store
                .read_path("processing/spikes/UnitTimes/unit_list")
                .unwrap()
                .into_value()
                .unwrap(),
            Value::from(vec!["unit-0"])
        );
    }
}
