//! Metadata path resolver
//!
//! A [`MetadataKey`] is a path template with `{}` placeholders plus the
//! arguments that fill them. Each argument becomes exactly one path segment,
//! so distinct arguments never collide, and the groups they name are created
//! on first use and reused afterwards. The last segment is the field name.
//!
//! The standard keys live in [`keys`]; they are data only.
//!
//! ## Example
//!
//! ```rust
//! use neurodata_db::metadata::{keys, set_metadata};
//! use neurodata_db::store::{MemoryStore, Value};
//!
//! # fn example() -> neurodata_db::Result<()> {
//! let mut store = MemoryStore::new();
//! set_metadata(&mut store, &keys::image_site_channel_lambda("p1", "red"), "520nm")?;
//! let stored = store.read_path("general/optophysiology/p1/red/emission_lambda")?;
//! assert_eq!(stored.into_value()?, Value::from("520nm"));
//! # Ok(())
//! # }
//! ```

pub mod keys;

use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::entity::FieldValue;
use crate::store::{check_segment, split_path, ContainerStore, NodeId, Value};
use crate::{Error, Result};

const PLACEHOLDER: &str = "{}";

/// Parametric metadata key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataKey {
    template: Cow<'static, str>,
    params: Vec<String>,
    custom: bool,
}

impl MetadataKey {
    /// Key for a field defined by the format.
    #[must_use]
    pub const fn new(template: &'static str) -> Self {
        Self {
            template: Cow::Borrowed(template),
            params: Vec::new(),
            custom: false,
        }
    }

    /// Key for a freeform field, tagged `neurodata_type = "Custom"` when
    /// written.
    #[must_use]
    pub const fn custom(template: &'static str) -> Self {
        Self {
            template: Cow::Borrowed(template),
            params: Vec::new(),
            custom: true,
        }
    }

    /// Key from a template built at runtime.
    #[must_use]
    pub fn from_template(template: impl Into<String>, custom: bool) -> Self {
        Self {
            template: Cow::Owned(template.into()),
            params: Vec::new(),
            custom,
        }
    }

    /// Fill the next placeholder.
    #[must_use]
    pub fn with(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Path template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// True for freeform fields.
    #[must_use]
    pub const fn is_custom(&self) -> bool {
        self.custom
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidMetadataKey {
            key: self.template.to_string(),
            reason: reason.into(),
        }
    }

    /// Expand the template into `(node path, field name)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMetadataKey` if the argument count does not
    /// match the placeholders, an argument is not a single path segment, or
    /// the expanded path has no parent group.
    pub fn resolve(&self) -> Result<(String, String)> {
        let expected = self.template.matches(PLACEHOLDER).count();
        if expected != self.params.len() {
            return Err(self.invalid(format!(
                "expects {expected} arguments, got {}",
                self.params.len()
            )));
        }
        let mut expanded = String::with_capacity(self.template.len());
        let mut rest: &str = &self.template;
        for param in &self.params {
            if check_segment(param).is_err() {
                return Err(self.invalid(format!("argument '{param}' is not a single path segment")));
            }
            if let Some((head, tail)) = rest.split_once(PLACEHOLDER) {
                expanded.push_str(head);
                expanded.push_str(param);
                rest = tail;
            }
        }
        expanded.push_str(rest);

        let segments = split_path(&expanded).map_err(|_| self.invalid("malformed path"))?;
        match segments.split_last() {
            Some((field, parents)) if !parents.is_empty() => {
                Ok((parents.join("/"), (*field).to_string()))
            }
            _ => Err(self.invalid("key must name a field inside a group")),
        }
    }
}

/// Resolve `key` and create its parent groups, reusing existing ones.
///
/// # Errors
///
/// Returns `Error::InvalidMetadataKey` for a bad key or a store error.
pub fn resolve_node<S: ContainerStore>(store: &mut S, key: &MetadataKey) -> Result<(NodeId, String)> {
    let (path, field) = key.resolve()?;
    Ok((store.create_node(&path)?, field))
}

/// Write a metadata value.
///
/// # Errors
///
/// Returns `Error::InvalidMetadataKey` for a bad key or a store error.
pub fn set_metadata<S: ContainerStore>(
    store: &mut S,
    key: &MetadataKey,
    value: impl Into<Value>,
) -> Result<()> {
    set_metadata_with_attributes(store, key, FieldValue::new(value))
}

/// Write a metadata value together with dataset attributes.
///
/// # Errors
///
/// Returns `Error::InvalidMetadataKey` for a bad key or a store error.
pub fn set_metadata_with_attributes<S: ContainerStore>(
    store: &mut S,
    key: &MetadataKey,
    value: FieldValue,
) -> Result<()> {
    let (node, field) = resolve_node(store, key)?;
    let id = store.write_dataset(node, &field, value.value().clone())?;
    for (name, attr) in value.attributes() {
        store.set_attribute(id, name, attr.clone())?;
    }
    if key.is_custom() {
        store.set_attribute(id, "neurodata_type", Value::from("Custom"))?;
    }
    Ok(())
}

/// Copy raw content from `reader` into a freeform field. UTF-8 content is
/// stored as text, anything else as bytes.
///
/// # Errors
///
/// Returns `Error::Io` if reading fails, or a key/store error.
pub fn set_metadata_from_reader<S: ContainerStore, R: Read>(
    store: &mut S,
    key: &MetadataKey,
    mut reader: R,
) -> Result<()> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    let value = match String::from_utf8(raw) {
        Ok(text) => Value::Text(text),
        Err(e) => Value::Bytes(e.into_bytes()),
    };
    let (node, field) = resolve_node(store, key)?;
    let id = store.write_dataset(node, &field, value)?;
    store.set_attribute(id, "neurodata_type", Value::from("Custom"))
}

/// Copy a file's content into a freeform field.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read, or a key/store error.
pub fn set_metadata_from_file<S: ContainerStore, P: AsRef<Path>>(
    store: &mut S,
    key: &MetadataKey,
    path: P,
) -> Result<()> {
    let file = File::open(path)?;
    set_metadata_from_reader(store, key, file)
}
