//! Module/interface framework
//!
//! A [`Module`] is a named processing unit under `processing/<name>`. It owns
//! interfaces, each a typed collection of records with its own accumulation
//! operations and finalize-time validation. Interfaces finalize
//! independently; the module finalizes once all of them have.
//!
//! ## Interface kinds
//!
//! | Kind | Records | Accepts |
//! |------|---------|---------|
//! | `BehavioralEvents`, `BehavioralEpochs`, `BehavioralTimeSeries`, `PupilTracking` | series | any `TimeSeries` |
//! | `Position`, `EyeTracking`, `CompassDirection` | series | `SpatialSeries` |
//! | `LFP`, `FilteredEphys` | series | `ElectricalSeries` |
//! | `Fluorescence`, `DfOverF` | series | `RoiResponseSeries` |
//! | `UnitTimes` | per-unit spike times | |
//! | `ImagingRetinotopy` | phase/power/sign maps, images | |

mod retinotopy;
mod series_group;
mod unit_times;

pub use retinotopy::{Axis, ImagingRetinotopy};
pub use series_group::{Member, SeriesGroup};
pub use unit_times::{UnitTimes, UNIT_LIST};

use std::fmt;
use std::str::FromStr;

use crate::store::{join_path, ContainerStore, NodeId, Value};
use crate::{Error, Result};

/// Handle to a module owned by an open container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

/// Handle to an interface owned by an open container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(pub(crate) usize);

/// Supported interface types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    /// Event series
    BehavioralEvents,
    /// Interval series
    BehavioralEpochs,
    /// Continuous behavioral series
    BehavioralTimeSeries,
    /// Pupil size series
    PupilTracking,
    /// Animal position
    Position,
    /// Eye position
    EyeTracking,
    /// Heading
    CompassDirection,
    /// Local field potential
    Lfp,
    /// Filtered electrical series
    FilteredEphys,
    /// ROI fluorescence
    Fluorescence,
    /// ROI dF/F
    DfOverF,
    /// Spike times per unit
    UnitTimes,
    /// Intrinsic signal imaging maps
    ImagingRetinotopy,
}

impl InterfaceKind {
    const ALL: [Self; 13] = [
        Self::BehavioralEvents,
        Self::BehavioralEpochs,
        Self::BehavioralTimeSeries,
        Self::PupilTracking,
        Self::Position,
        Self::EyeTracking,
        Self::CompassDirection,
        Self::Lfp,
        Self::FilteredEphys,
        Self::Fluorescence,
        Self::DfOverF,
        Self::UnitTimes,
        Self::ImagingRetinotopy,
    ];

    /// Stored interface name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BehavioralEvents => "BehavioralEvents",
            Self::BehavioralEpochs => "BehavioralEpochs",
            Self::BehavioralTimeSeries => "BehavioralTimeSeries",
            Self::PupilTracking => "PupilTracking",
            Self::Position => "Position",
            Self::EyeTracking => "EyeTracking",
            Self::CompassDirection => "CompassDirection",
            Self::Lfp => "LFP",
            Self::FilteredEphys => "FilteredEphys",
            Self::Fluorescence => "Fluorescence",
            Self::DfOverF => "DfOverF",
            Self::UnitTimes => "UnitTimes",
            Self::ImagingRetinotopy => "ImagingRetinotopy",
        }
    }

    /// Series type a series-group interface accepts (`None` for record
    /// interfaces).
    #[must_use]
    pub const fn accepts(self) -> Option<&'static str> {
        match self {
            Self::BehavioralEvents
            | Self::BehavioralEpochs
            | Self::BehavioralTimeSeries
            | Self::PupilTracking => Some("TimeSeries"),
            Self::Position | Self::EyeTracking | Self::CompassDirection => Some("SpatialSeries"),
            Self::Lfp | Self::FilteredEphys => Some("ElectricalSeries"),
            Self::Fluorescence | Self::DfOverF => Some("RoiResponseSeries"),
            Self::UnitTimes | Self::ImagingRetinotopy => None,
        }
    }

    fn empty_body(self) -> InterfaceBody {
        match self {
            Self::UnitTimes => InterfaceBody::UnitTimes(UnitTimes::new()),
            Self::ImagingRetinotopy => InterfaceBody::ImagingRetinotopy(ImagingRetinotopy::new()),
            series => InterfaceBody::SeriesGroup(SeriesGroup::new(series)),
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InterfaceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::UnknownType(s.to_string()))
    }
}

/// Records of one interface type: validated and written at finalize.
pub trait InterfaceData {
    /// Check interface-specific invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` describing the first violation.
    fn validate(&self, interface: &str) -> Result<()>;

    /// Write the accumulated records under the interface group `node`.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects a write.
    fn write<S: ContainerStore>(&self, store: &mut S, path: &str, node: NodeId) -> Result<()>;
}

/// Accumulated records, by interface shape.
#[derive(Debug, Clone)]
pub enum InterfaceBody {
    /// Typed series placed or linked under the interface
    SeriesGroup(SeriesGroup),
    /// Spike times per unit
    UnitTimes(UnitTimes),
    /// Retinotopy maps
    ImagingRetinotopy(ImagingRetinotopy),
}

impl InterfaceData for InterfaceBody {
    fn validate(&self, interface: &str) -> Result<()> {
        match self {
            Self::SeriesGroup(group) => group.validate(interface),
            Self::UnitTimes(units) => units.validate(interface),
            Self::ImagingRetinotopy(maps) => maps.validate(interface),
        }
    }

    fn write<S: ContainerStore>(&self, store: &mut S, path: &str, node: NodeId) -> Result<()> {
        match self {
            Self::SeriesGroup(group) => group.write(store, path, node),
            Self::UnitTimes(units) => units.write(store, path, node),
            Self::ImagingRetinotopy(maps) => maps.write(store, path, node),
        }
    }
}

/// One interface inside a module.
#[derive(Debug, Clone)]
pub struct Interface {
    module: ModuleId,
    module_name: String,
    kind: InterfaceKind,
    body: InterfaceBody,
    finalized: bool,
}

impl Interface {
    pub(crate) fn new(module: ModuleId, module_name: &str, kind: InterfaceKind) -> Self {
        Self {
            module,
            module_name: module_name.to_string(),
            kind,
            body: kind.empty_body(),
            finalized: false,
        }
    }

    /// Owning module.
    #[must_use]
    pub const fn module(&self) -> ModuleId {
        self.module
    }

    /// Interface type.
    #[must_use]
    pub const fn kind(&self) -> InterfaceKind {
        self.kind
    }

    /// Interface name (its type name).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Name of the owning module.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Container path `processing/<module>/<interface>`.
    #[must_use]
    pub fn path(&self) -> String {
        join_path(&module_path(&self.module_name), self.name())
    }

    /// True once finalized.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Accumulated records.
    #[must_use]
    pub const fn body(&self) -> &InterfaceBody {
        &self.body
    }

    /// Mutable records, refused after finalize.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` after finalize.
    pub(crate) fn body_mut(&mut self) -> Result<&mut InterfaceBody> {
        if self.finalized {
            return Err(Error::EntityFinalized(self.path()));
        }
        Ok(&mut self.body)
    }

    /// Validate and write the interface, then freeze it.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` on a second finalize,
    /// `Error::InvalidRecord` if validation fails, or a store error.
    pub(crate) fn finalize<S: ContainerStore>(&mut self, store: &mut S) -> Result<()> {
        if self.finalized {
            return Err(Error::EntityFinalized(self.path()));
        }
        self.body.validate(self.name())?;
        let path = self.path();
        let existed = store.exists(&path);
        let node = store.create_node(&path)?;
        let before = store.children(node)?;
        let written = store
            .set_attribute(node, "neurodata_type", Value::from("Interface"))
            .and_then(|()| self.body.write(store, &path, node));
        if let Err(e) = written {
            // undo this attempt, keeping children that were already there
            if existed {
                for child in store.children(node)? {
                    if !before.contains(&child) {
                        store.remove(&join_path(&path, &child))?;
                    }
                }
            } else {
                store.remove(&path)?;
            }
            return Err(e);
        }
        self.finalized = true;
        tracing::debug!("finalized interface {path}");
        Ok(())
    }
}

/// `processing/<name>`
#[must_use]
pub fn module_path(name: &str) -> String {
    join_path("processing", name)
}

/// Named processing unit grouping interfaces.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    description: Option<String>,
    interfaces: Vec<InterfaceId>,
    finalized: bool,
}

impl Module {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            interfaces: Vec::new(),
            finalized: false,
        }
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container path.
    #[must_use]
    pub fn path(&self) -> String {
        module_path(&self.name)
    }

    /// Interfaces in creation order.
    #[must_use]
    pub fn interfaces(&self) -> &[InterfaceId] {
        &self.interfaces
    }

    /// True once finalized.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.finalized {
            Err(Error::EntityFinalized(self.path()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn set_description(&mut self, description: &str) -> Result<()> {
        self.ensure_open()?;
        self.description = Some(description.to_string());
        Ok(())
    }

    pub(crate) fn push_interface(&mut self, id: InterfaceId) {
        self.interfaces.push(id);
    }

    pub(crate) fn forget_interface(&mut self, id: InterfaceId) {
        self.interfaces.retain(|i| *i != id);
    }

    /// Finalize once every interface has been finalized. `lookup` returns
    /// the interface behind an id.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` on a second finalize and
    /// `Error::IncompleteModule` naming the unfinalized interfaces.
    pub(crate) fn finalize<'a, S, F>(&mut self, store: &mut S, lookup: F) -> Result<()>
    where
        S: ContainerStore,
        F: Fn(InterfaceId) -> Option<&'a Interface>,
    {
        self.ensure_open()?;
        let mut names = Vec::with_capacity(self.interfaces.len());
        let mut pending = Vec::new();
        for id in &self.interfaces {
            let iface = lookup(*id).ok_or_else(|| Error::NotFound(format!("interface {}", id.0)))?;
            if !iface.is_finalized() {
                pending.push(iface.name().to_string());
            }
            names.push(iface.name().to_string());
        }
        if !pending.is_empty() {
            return Err(Error::IncompleteModule {
                module: self.name.clone(),
                pending,
            });
        }
        let node = store.create_node(&self.path())?;
        store.set_attribute(node, "neurodata_type", Value::from("Module"))?;
        store.set_attribute(node, "interfaces", Value::TextList(names))?;
        if let Some(description) = &self.description {
            store.set_attribute(node, "description", Value::from(description.as_str()))?;
        }
        self.finalized = true;
        tracing::debug!("finalized module {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_kind_round_trip_names() {
        for kind in InterfaceKind::ALL {
            assert_eq!(kind.name().parse::<InterfaceKind>().unwrap(), kind);
        }
        assert!(matches!(
            "Nope".parse::<InterfaceKind>(),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_accepts() {
        assert_eq!(InterfaceKind::Lfp.accepts(), Some("ElectricalSeries"));
        assert_eq!(InterfaceKind::BehavioralEvents.accepts(), Some("TimeSeries"));
        assert_eq!(InterfaceKind::UnitTimes.accepts(), None);
    }

    #[test]
    fn test_module_incomplete() {
        let mut store = MemoryStore::new();
        let mut module = Module::new("m");
        let iface = Interface::new(ModuleId(0), "m", InterfaceKind::BehavioralEvents);
        module.push_interface(InterfaceId(0));
        let err = module.finalize(&mut store, |_| Some(&iface)).unwrap_err();
        assert!(matches!(
            err,
            Error::IncompleteModule { module, pending } if module == "m" && pending == vec!["BehavioralEvents"]
        ));
        assert!(!store.exists("processing/m"));
    }

    #[test]
    fn test_module_finalize_twice() {
        let mut store = MemoryStore::new();
        let mut module = Module::new("m");
        module.set_description("spikes").unwrap();
        module.finalize(&mut store, |_| None).unwrap();
        assert_eq!(
            store.attribute_at("processing/m", "neurodata_type").unwrap(),
            Value::from("Module")
        );
        assert!(matches!(
            module.finalize(&mut store, |_| None),
            Err(Error::EntityFinalized(_))
        ));
        assert!(module.set_description("x").is_err());
    }

    #[test]
    fn test_interface_finalize_failure_leaves_no_writes() {
        let mut store = MemoryStore::new();
        let ts = store.create_node("acquisition/timeseries/a").unwrap();
        store.write_dataset(ts, "data", Value::from(vec![1.0])).unwrap();
        let mut iface = Interface::new(ModuleId(0), "m", InterfaceKind::BehavioralEvents);
        let InterfaceBody::SeriesGroup(group) = iface.body_mut().unwrap() else {
            panic!("expected a series group");
        };
        group.push("a", Member::Linked("acquisition/timeseries/a".to_string()));
        group.push("b", Member::Linked("acquisition/timeseries/missing".to_string()));

        assert!(matches!(iface.finalize(&mut store), Err(Error::NotFound(_))));
        assert!(!iface.is_finalized());
        assert!(!store.exists("processing/m/BehavioralEvents"));

        // an owned series already placed under the interface survives the rollback
        let owned = store.create_node("processing/m/BehavioralEvents/owned").unwrap();
        store.write_dataset(owned, "data", Value::from(vec![2.0])).unwrap();
        assert!(iface.finalize(&mut store).is_err());
        assert!(store.exists("processing/m/BehavioralEvents/owned/data"));
        assert!(!store.exists("processing/m/BehavioralEvents/a"));
    }

    #[test]
    fn test_interface_finalize_once() {
        let mut store = MemoryStore::new();
        let mut iface = Interface::new(ModuleId(0), "m", InterfaceKind::BehavioralEvents);
        iface.finalize(&mut store).unwrap();
        assert_eq!(iface.path(), "processing/m/BehavioralEvents");
        assert!(iface.finalize(&mut store).is_err());
        assert!(iface.body_mut().is_err());
    }
}
