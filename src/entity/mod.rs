//! Entity engine: typed objects built in memory and materialized on finalize
//!
//! An [`Entity`] is an instance of an [`EntityType`]. Its fields are set,
//! ignored or linked until finalize validates the contract; the container
//! then writes the resulting plan through the store adapter and the
//! entity becomes immutable.
//!
//! ## Lifecycle
//!
//! ```text
//! create ──> set_field / ignore_field / link ──> finalize ──> (immutable)
//!                       │                            │
//!                       └── EntityFinalized <────────┘ any later mutation
//! ```

mod finalize;
mod placement;

pub(crate) use finalize::FinalizePlan;
pub use placement::Placement;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::link::LinkRecord;
use crate::schema::{EntityType, FieldRule};
use crate::store::{check_segment, Value};
use crate::{Error, Result};

/// Handle to an entity owned by an open container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) usize);

/// A field value with the attributes stored alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    value: Value,
    attributes: BTreeMap<String, Value>,
}

impl FieldValue {
    /// Bare value.
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute written on the dataset.
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// The value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Dataset attributes.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }
}

impl<T: Into<Value>> From<T> for FieldValue {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// State of one field before finalize.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldState {
    /// Direct value
    Value(FieldValue),
    /// Shares storage with another entity's field
    Link(LinkRecord),
    /// Intentionally omitted
    Ignored,
}

impl FieldState {
    /// True for a value or a link.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Value(_) | Self::Link(_))
    }
}

/// One timed annotation of an `AnnotationSeries`.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Annotation text
    pub text: String,
    /// Time in seconds
    pub time: f64,
}

/// Typed object under construction.
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    ty: Arc<EntityType>,
    placement: Placement,
    fields: BTreeMap<String, FieldState>,
    annotations: Vec<Annotation>,
    provenance: BTreeMap<&'static str, Vec<String>>,
    finalized: bool,
}

impl Entity {
    /// Create an unfinalized entity.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: Arc<EntityType>, placement: Placement) -> Self {
        Self {
            name: name.into(),
            ty,
            placement,
            fields: BTreeMap::new(),
            annotations: Vec::new(),
            provenance: BTreeMap::new(),
            finalized: false,
        }
    }

    /// Entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity type.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.ty
    }

    /// Current placement.
    #[must_use]
    pub const fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Full container path.
    #[must_use]
    pub fn path(&self) -> String {
        self.placement.entity_path(&self.name)
    }

    /// True once finalized.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// State of a field, if it was touched.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&FieldState> {
        self.fields.get(field)
    }

    /// Accumulated annotations, in insertion order.
    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Pending provenance entries keyed by attribute name.
    #[must_use]
    pub const fn provenance(&self) -> &BTreeMap<&'static str, Vec<String>> {
        &self.provenance
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.finalized {
            Err(Error::EntityFinalized(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn already(&self, field: &str) -> Error {
        Error::AlreadyLinked {
            entity: self.name.clone(),
            field: field.to_string(),
        }
    }

    fn check_alternative(&self, field: &str) -> Result<()> {
        if let Some(other) = self.ty.alternative(field) {
            if self.fields.get(other).is_some_and(FieldState::is_present) {
                return Err(Error::ExclusiveFields {
                    entity: self.name.clone(),
                    first: other.to_string(),
                    second: field.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Set a field to a direct value. Fields outside the type's contract are
    /// kept as custom fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` after finalize, `Error::AlreadyLinked`
    /// if the field is a link or annotations own it, `Error::ExclusiveFields`
    /// if its alternative is already set.
    pub fn set_field(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        self.ensure_mutable()?;
        check_segment(field)?;
        if matches!(self.fields.get(field), Some(FieldState::Link(_))) {
            return Err(self.already(field));
        }
        if !self.annotations.is_empty() && (field == "data" || field == "timestamps") {
            return Err(self.already(field));
        }
        self.check_alternative(field)?;
        self.fields
            .insert(field.to_string(), FieldState::Value(value.into()));
        Ok(())
    }

    /// Mark an optional field as intentionally omitted.
    ///
    /// # Errors
    ///
    /// Returns `Error::OptionalFieldOnly` for required or custom fields and
    /// `Error::AlreadyLinked` if the field already has a value or link.
    pub fn ignore_field(&mut self, field: &str) -> Result<()> {
        self.ignore_fields(&[field])
    }

    /// Mark several optional fields as omitted. Nothing changes unless every
    /// field can be ignored.
    ///
    /// # Errors
    ///
    /// Same as [`Entity::ignore_field`], for the first offending field.
    pub fn ignore_fields(&mut self, fields: &[&str]) -> Result<()> {
        self.ensure_mutable()?;
        for field in fields {
            if self.ty.rule(field) != Some(FieldRule::Optional) {
                return Err(Error::OptionalFieldOnly {
                    type_name: self.ty.name().to_string(),
                    field: (*field).to_string(),
                });
            }
            if self.fields.get(*field).is_some_and(FieldState::is_present) {
                return Err(self.already(field));
            }
        }
        for field in fields {
            self.fields.insert((*field).to_string(), FieldState::Ignored);
        }
        Ok(())
    }

    /// Record that `field` shares storage with another entity.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyLinked` if the field already has a value or link.
    pub fn set_link(&mut self, record: LinkRecord) -> Result<()> {
        self.ensure_mutable()?;
        let field = record.source_field().to_string();
        if self.fields.get(&field).is_some_and(FieldState::is_present) {
            return Err(self.already(&field));
        }
        if !self.annotations.is_empty() {
            return Err(self.already(&field));
        }
        self.check_alternative(&field)?;
        self.fields.insert(field, FieldState::Link(record));
        Ok(())
    }

    /// Queue a provenance entry to be written on finalize.
    pub(crate) fn push_provenance(&mut self, key: &'static str, entry: String) {
        let entries = self.provenance.entry(key).or_default();
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }

    /// Add one timed annotation (`AnnotationSeries` and subtypes only).
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` for other types and
    /// `Error::AlreadyLinked` if data or timestamps were set another way.
    pub fn add_annotation(&mut self, text: impl Into<String>, time: f64) -> Result<()> {
        self.ensure_mutable()?;
        if !self.ty.is_a("AnnotationSeries") {
            return Err(Error::TypeMismatch {
                expected: "AnnotationSeries".to_string(),
                found: self.ty.name().to_string(),
            });
        }
        for field in ["data", "timestamps"] {
            if self.fields.get(field).is_some_and(FieldState::is_present) {
                return Err(self.already(field));
            }
        }
        self.annotations.push(Annotation {
            text: text.into(),
            time,
        });
        Ok(())
    }

    /// Move the entity to another placement (used when an interface adopts it).
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` after finalize.
    pub(crate) fn relocate(&mut self, placement: Placement) -> Result<()> {
        self.ensure_mutable()?;
        self.placement = placement;
        Ok(())
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.finalized = true;
        self.provenance.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkTarget;
    use crate::schema::TypeRegistry;

    fn entity(ty: &str) -> Entity {
        let registry = TypeRegistry::standard();
        Entity::new("e", registry.resolve(ty).unwrap(), Placement::Acquisition)
    }

    fn link(field: &str) -> LinkRecord {
        LinkRecord::new("e", field, "other", field, LinkTarget::Local(EntityId(9))).unwrap()
    }

    #[test]
    fn test_set_after_link_rejected() {
        let mut e = entity("TimeSeries");
        e.set_link(link("data")).unwrap();
        assert!(matches!(
            e.set_field("data", vec![1.0]),
            Err(Error::AlreadyLinked { .. })
        ));
    }

    #[test]
    fn test_link_after_value_rejected() {
        let mut e = entity("TimeSeries");
        e.set_field("data", vec![1.0]).unwrap();
        assert!(matches!(
            e.set_link(link("data")),
            Err(Error::AlreadyLinked { .. })
        ));
    }

    #[test]
    fn test_ignore_required_rejected() {
        let mut e = entity("AnnotationSeries");
        assert!(matches!(
            e.ignore_field("data"),
            Err(Error::OptionalFieldOnly { .. })
        ));
        e.ignore_field("comment").unwrap();
        assert_eq!(e.field("comment"), Some(&FieldState::Ignored));
    }

    #[test]
    fn test_ignore_custom_rejected() {
        let mut e = entity("TimeSeries");
        assert!(e.ignore_field("my_custom").is_err());
    }

    #[test]
    fn test_exclusive_time_fields() {
        let mut e = entity("TimeSeries");
        e.set_field("timestamps", vec![0.0]).unwrap();
        assert!(matches!(
            e.set_field("starting_time", 0.0),
            Err(Error::ExclusiveFields { .. })
        ));
    }

    #[test]
    fn test_annotation_requires_annotation_type() {
        let mut e = entity("TimeSeries");
        assert!(matches!(
            e.add_annotation("x", 1.0),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_annotations_own_data() {
        let mut e = entity("AnnotationSeries");
        e.add_annotation("start", 1.0).unwrap();
        assert!(e.set_field("data", vec!["x"]).is_err());
        assert!(e.set_link(link("timestamps")).is_err());
    }

    #[test]
    fn test_ignore_fields_all_or_nothing() {
        let mut e = entity("TimeSeries");
        e.set_field("starting_time", 0.0).unwrap();
        assert!(matches!(
            e.ignore_fields(&["timestamps", "starting_time"]),
            Err(Error::AlreadyLinked { field, .. }) if field == "starting_time"
        ));
        assert!(e.field("timestamps").is_none());
        e.ignore_fields(&["timestamps", "comment"]).unwrap();
        assert!(matches!(e.field("timestamps"), Some(FieldState::Ignored)));
        assert!(matches!(e.field("comment"), Some(FieldState::Ignored)));
    }

    #[test]
    fn test_mutation_after_finalize() {
        let mut e = entity("TimeSeries");
        e.mark_finalized();
        assert!(matches!(
            e.set_field("data", vec![1.0]),
            Err(Error::EntityFinalized(name)) if name == "e"
        ));
        assert!(e.ignore_field("comment").is_err());
        assert!(e.relocate(Placement::StimulusTemplate).is_err());
    }

    #[test]
    fn test_field_name_must_be_single_segment() {
        let mut e = entity("TimeSeries");
        assert!(matches!(
            e.set_field("a/b", 1.0),
            Err(Error::InvalidPath(_))
        ));
    }
}
