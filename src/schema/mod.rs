//! Type registry: entity types, ancestry chains and field contracts
//!
//! Types are registered bottom-up. A subtype's chain is its own name
//! prepended to the parent's chain, and its contract is the parent's contract
//! with the subtype's additions (a subtype may promote an optional field to
//! required, never the reverse).
//!
//! ## Usage
//!
//! ```rust
//! use neurodata_db::schema::TypeRegistry;
//!
//! let registry = TypeRegistry::standard();
//! assert!(registry.is_ancestor("AnnotationSeries", "TimeSeries").unwrap());
//! assert!(!registry.is_ancestor("TimeSeries", "AnnotationSeries").unwrap());
//! ```

mod standard;

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;

use crate::{Error, Result};

/// Fields that may be satisfied by a link instead of a direct value.
pub const LINKABLE_FIELDS: [&str; 2] = ["data", "timestamps"];

/// Whether a contract field must be present at finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Must carry a value (or link) at finalize
    Required,
    /// May be omitted; omission is recorded in `missing_fields`
    Optional,
}

/// Immutable description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: String,
    family: String,
    chain: Vec<String>,
    required: BTreeSet<String>,
    optional: BTreeSet<String>,
    exclusive: Vec<(String, String)>,
}

impl EntityType {
    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root type of the chain, stored as `neurodata_type`.
    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Ancestry, most specific first (self included).
    #[must_use]
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// True if `ancestor` is this type or one of its ancestors.
    #[must_use]
    pub fn is_a(&self, ancestor: &str) -> bool {
        self.chain.iter().any(|t| t == ancestor)
    }

    /// Ancestry root-to-leaf, the order written to the `ancestry` attribute.
    #[must_use]
    pub fn ancestry(&self) -> Vec<String> {
        self.chain.iter().rev().cloned().collect()
    }

    /// Required field names.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.required.iter().map(String::as_str)
    }

    /// Optional field names.
    pub fn optional(&self) -> impl Iterator<Item = &str> {
        self.optional.iter().map(String::as_str)
    }

    /// Contract rule for `field`, or `None` for fields outside the contract.
    #[must_use]
    pub fn rule(&self, field: &str) -> Option<FieldRule> {
        if self.required.contains(field) {
            Some(FieldRule::Required)
        } else if self.optional.contains(field) {
            Some(FieldRule::Optional)
        } else {
            None
        }
    }

    /// The field that excludes `field`, if the two form an either/or pair.
    #[must_use]
    pub fn alternative(&self, field: &str) -> Option<&str> {
        self.exclusive.iter().find_map(|(a, b)| {
            if a == field {
                Some(b.as_str())
            } else if b == field {
                Some(a.as_str())
            } else {
                None
            }
        })
    }

    /// Mutually exclusive field pairs.
    #[must_use]
    pub fn exclusive_pairs(&self) -> &[(String, String)] {
        &self.exclusive
    }
}

/// Contract additions for one type, consumed by [`TypeRegistry::register`].
#[derive(Debug, Default, Clone)]
pub struct TypeSpec {
    required: Vec<String>,
    optional: Vec<String>,
    exclusive: Vec<(String, String)>,
}

impl TypeSpec {
    /// Empty contract.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add required fields.
    #[must_use]
    pub fn required(mut self, fields: &[&str]) -> Self {
        self.required.extend(fields.iter().map(|f| (*f).to_string()));
        self
    }

    /// Add optional fields.
    #[must_use]
    pub fn optional(mut self, fields: &[&str]) -> Self {
        self.optional.extend(fields.iter().map(|f| (*f).to_string()));
        self
    }

    /// Declare two fields as alternatives: at most one may be set, and a value
    /// in either keeps the other out of `missing_fields`.
    #[must_use]
    pub fn exclusive(mut self, first: &str, second: &str) -> Self {
        self.exclusive.push((first.to_string(), second.to_string()));
        self
    }
}

/// Static table of entity types, resolved by name.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: FxHashMap<String, Arc<EntityType>>,
}

impl TypeRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the standard series types.
    #[must_use]
    pub fn standard() -> Self {
        standard::build()
    }

    /// Shared standard registry, built once per process.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::standard())))
    }

    /// Register `name` as a subtype of `parent` (`None` for a root type).
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` if the name is taken and
    /// `Error::UnknownType` if the parent is not registered.
    pub fn register(&mut self, name: &str, parent: Option<&str>, spec: TypeSpec) -> Result<()> {
        if self.types.contains_key(name) {
            return Err(Error::AlreadyExists(format!("type {name}")));
        }
        let base = parent.map(|p| self.resolve(p)).transpose()?;
        self.derive(name, base.as_deref(), spec);
        Ok(())
    }

    /// Insert `name` on top of `base` without validation.
    fn derive(&mut self, name: &str, base: Option<&EntityType>, spec: TypeSpec) -> Arc<EntityType> {
        let mut ty = match base {
            Some(base) => {
                let mut chain = Vec::with_capacity(base.chain.len() + 1);
                chain.push(name.to_string());
                chain.extend(base.chain.iter().cloned());
                EntityType {
                    name: name.to_string(),
                    family: base.family.clone(),
                    chain,
                    required: base.required.clone(),
                    optional: base.optional.clone(),
                    exclusive: base.exclusive.clone(),
                }
            }
            None => EntityType {
                name: name.to_string(),
                family: name.to_string(),
                chain: vec![name.to_string()],
                required: BTreeSet::new(),
                optional: BTreeSet::new(),
                exclusive: Vec::new(),
            },
        };
        for field in spec.required {
            ty.optional.remove(&field);
            ty.required.insert(field);
        }
        for field in spec.optional {
            if !ty.required.contains(&field) {
                ty.optional.insert(field);
            }
        }
        ty.exclusive.extend(spec.exclusive);
        let ty = Arc::new(ty);
        self.types.insert(name.to_string(), Arc::clone(&ty));
        ty
    }

    /// Look up a type by name.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownType` if the type is not registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<EntityType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// True if `candidate` appears in the ancestry chain of `name`
    /// (a type is its own ancestor).
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownType` if `name` is not registered.
    pub fn is_ancestor(&self, name: &str, candidate: &str) -> Result<bool> {
        Ok(self.resolve(name)?.is_a(candidate))
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True when no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type() {
        let registry = TypeRegistry::new();
        assert!(matches!(
            registry.resolve("Nope"),
            Err(Error::UnknownType(name)) if name == "Nope"
        ));
    }

    #[test]
    fn test_chain_prepends_parent() {
        let mut registry = TypeRegistry::new();
        registry.register("A", None, TypeSpec::new()).unwrap();
        registry.register("B", Some("A"), TypeSpec::new()).unwrap();
        registry.register("C", Some("B"), TypeSpec::new()).unwrap();
        let c = registry.resolve("C").unwrap();
        assert_eq!(c.chain(), &["C", "B", "A"]);
        assert_eq!(c.ancestry(), vec!["A", "B", "C"]);
        assert_eq!(c.family(), "A");
    }

    #[test]
    fn test_subtype_promotes_optional() {
        let mut registry = TypeRegistry::new();
        registry
            .register("A", None, TypeSpec::new().optional(&["data", "comment"]))
            .unwrap();
        registry
            .register("B", Some("A"), TypeSpec::new().required(&["data"]))
            .unwrap();
        let b = registry.resolve("B").unwrap();
        assert_eq!(b.rule("data"), Some(FieldRule::Required));
        assert_eq!(b.rule("comment"), Some(FieldRule::Optional));
        assert_eq!(b.rule("other"), None);

        let a = registry.resolve("A").unwrap();
        assert_eq!(a.rule("data"), Some(FieldRule::Optional));
    }

    #[test]
    fn test_subtype_cannot_demote_required() {
        let mut registry = TypeRegistry::new();
        registry
            .register("A", None, TypeSpec::new().required(&["data"]))
            .unwrap();
        registry
            .register("B", Some("A"), TypeSpec::new().optional(&["data"]))
            .unwrap();
        assert_eq!(
            registry.resolve("B").unwrap().rule("data"),
            Some(FieldRule::Required)
        );
    }

    #[test]
    fn test_duplicate_and_unknown_parent() {
        let mut registry = TypeRegistry::new();
        registry.register("A", None, TypeSpec::new()).unwrap();
        assert!(registry.register("A", None, TypeSpec::new()).is_err());
        assert!(registry.register("B", Some("Z"), TypeSpec::new()).is_err());
    }

    #[test]
    fn test_alternative_lookup() {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                "A",
                None,
                TypeSpec::new()
                    .optional(&["timestamps", "starting_time"])
                    .exclusive("timestamps", "starting_time"),
            )
            .unwrap();
        let a = registry.resolve("A").unwrap();
        assert_eq!(a.alternative("timestamps"), Some("starting_time"));
        assert_eq!(a.alternative("starting_time"), Some("timestamps"));
        assert_eq!(a.alternative("data"), None);
    }

    #[test]
    fn test_global_is_shared() {
        let a = TypeRegistry::global();
        let b = TypeRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.resolve("TimeSeries").is_ok());
    }
}
