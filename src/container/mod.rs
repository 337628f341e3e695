//! Container lifecycle manager
//!
//! A [`Container`] owns everything of one open session: the store, every
//! entity, module and interface created through it (arena-owned, addressed
//! by `Copy` ids), the epoch registry and the modification log. Nothing
//! reaches disk until [`Container::close`], which refuses to run while
//! anything is unfinalized and then writes the whole container atomically.
//!
//! ## States
//!
//! ```text
//! Closed ──create──> Open(create) ──close──> Closed
//! Closed ──append/modify──> Open(append|modify) ──close──> Closed
//! ```
//!
//! Append adds objects only; modify may also replace objects stored by
//! earlier sessions. Every write-mode open of an existing container appends
//! one entry to the modification log.

mod builder;
mod clock;
mod log;
mod series;

pub use builder::{ContainerBuilder, ContainerSettings};
pub use clock::{create_identifier, Clock, SystemClock, FORMAT_VERSION};
pub use log::{ModificationLog, LOG_FIELD};
pub use series::SeriesMut;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::entity::{Entity, EntityId, FieldValue, Placement};
use crate::epoch::{EpochId, EpochRegistry};
use crate::link::{append_provenance, LinkKind, LinkRecord, LinkTarget};
use crate::metadata::{self, MetadataKey};
use crate::module::{
    module_path, ImagingRetinotopy, Interface, InterfaceBody, InterfaceId, InterfaceKind, Member,
    Module, ModuleId, SeriesGroup, UnitTimes,
};
use crate::schema::TypeRegistry;
use crate::store::{check_segment, join_path, split_path, ContainerStore, MemoryStore, Value};
use crate::{Error, Result};

/// Group holding reference images.
pub const IMAGES_PATH: &str = "acquisition/images";

const SKELETON: [&str; 7] = [
    "acquisition/timeseries",
    IMAGES_PATH,
    "stimulus/presentation",
    "stimulus/templates",
    "processing",
    "analysis",
    "general",
];

/// How the container was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// New container
    Create,
    /// Existing container, new objects only
    Append,
    /// Existing container, objects may be replaced
    Modify,
}

/// One open recording container.
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    mode: OpenMode,
    store: MemoryStore,
    registry: Arc<TypeRegistry>,
    entities: Vec<Option<Entity>>,
    modules: Vec<Option<Module>>,
    interfaces: Vec<Option<Interface>>,
    epochs: EpochRegistry,
    log: ModificationLog,
    open: bool,
}

fn not_found<T>(what: &str, index: usize) -> Result<T> {
    Err(Error::NotFound(format!("{what} #{index}")))
}

impl Container {
    /// Start configuring a container stored at `path`.
    #[must_use]
    pub fn builder(path: impl Into<PathBuf>) -> ContainerBuilder {
        ContainerBuilder::new(path)
    }

    fn assemble(
        path: PathBuf,
        mode: OpenMode,
        store: MemoryStore,
        registry: Arc<TypeRegistry>,
        epochs: EpochRegistry,
        log: ModificationLog,
    ) -> Self {
        Self {
            path,
            mode,
            store,
            registry,
            entities: Vec::new(),
            modules: Vec::new(),
            interfaces: Vec::new(),
            epochs,
            log,
            open: true,
        }
    }

    pub(crate) fn create_new(
        path: PathBuf,
        identifier: &str,
        description: &str,
        start_time: Option<&str>,
        clock: Arc<dyn Clock>,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self> {
        let mut store = MemoryStore::new();
        for group in SKELETON {
            store.create_node(group)?;
        }
        let now = clock.now();
        let root = store.create_node("")?;
        store.write_dataset(root, "identifier", Value::from(identifier))?;
        store.write_dataset(root, "session_description", Value::from(description))?;
        let start = start_time.map_or_else(|| now.to_rfc2822(), str::to_string);
        store.write_dataset(root, "session_start_time", Value::from(start))?;
        store.write_dataset(root, "nwb_version", Value::from(FORMAT_VERSION))?;
        let mut log = ModificationLog::new();
        log.append(now);
        tracing::info!("created container {} ({identifier})", path.display());
        Ok(Self::assemble(
            path,
            OpenMode::Create,
            store,
            registry,
            EpochRegistry::new(),
            log,
        ))
    }

    pub(crate) fn open_existing(
        path: PathBuf,
        mode: OpenMode,
        clock: Arc<dyn Clock>,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let store = MemoryStore::load(&path)?;
        let epochs = EpochRegistry::load(&store)?;
        let mut log = ModificationLog::load(&store)?;
        log.append(clock.now());
        tracing::info!(
            "opened container {} for {:?} ({} prior opens)",
            path.display(),
            mode,
            log.len() - 1
        );
        Ok(Self::assemble(path, mode, store, registry, epochs, log))
    }

    /// Container location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open mode.
    #[must_use]
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    /// True until [`Container::close`] succeeds.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Type registry used for new entities.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// In-memory store (read access).
    #[must_use]
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Modification log including this session's entry.
    #[must_use]
    pub const fn modification_log(&self) -> &ModificationLog {
        &self.log
    }

    /// Epochs of this session.
    #[must_use]
    pub const fn epochs(&self) -> &EpochRegistry {
        &self.epochs
    }

    /// Stored container identifier.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the root dataset is missing.
    pub fn identifier(&self) -> Result<String> {
        match self.store.read_path("identifier")?.into_value()? {
            Value::Text(id) => Ok(id),
            other => Err(Error::TypeMismatch {
                expected: "text".to_string(),
                found: format!("{other:?}"),
            }),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::ContainerClosed(self.path.display().to_string()))
        }
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Entity behind an id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown or abandoned id.
    pub fn entity(&self, id: EntityId) -> Result<&Entity> {
        match self.entities.get(id.0) {
            Some(Some(entity)) => Ok(entity),
            _ => not_found("entity", id.0),
        }
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity> {
        match self.entities.get_mut(id.0) {
            Some(Some(entity)) => Ok(entity),
            _ => not_found("entity", id.0),
        }
    }

    fn live_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().flatten()
    }

    /// Create an unfinalized series of type `type_name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownType` for unregistered types,
    /// `Error::AlreadyExists` if the path is taken (in append mode this
    /// includes objects stored by earlier sessions), and
    /// `Error::InvalidPath` for bad names or interface placements (series
    /// reach interfaces through [`Container::add_timeseries`]).
    pub fn create_timeseries(
        &mut self,
        type_name: &str,
        name: &str,
        placement: Placement,
    ) -> Result<EntityId> {
        self.ensure_open()?;
        let ty = self.registry.resolve(type_name)?;
        check_segment(name)?;
        if matches!(placement, Placement::Interface { .. }) {
            return Err(Error::InvalidPath(format!(
                "{}: add series to interfaces with add_timeseries",
                placement.entity_path(name)
            )));
        }
        let path = placement.entity_path(name);
        if self.live_entities().any(|e| e.path() == path)
            || (self.mode != OpenMode::Modify && self.store.exists(&path))
        {
            return Err(Error::AlreadyExists(path));
        }
        self.entities.push(Some(Entity::new(name, ty, placement)));
        Ok(EntityId(self.entities.len() - 1))
    }

    /// Register a series stored by an earlier session, so that it can be
    /// the target of [`Container::link_field`] or
    /// [`Container::add_timeseries_as_link`]. The entity is read-only
    /// (finalized). Asking twice for the same path returns the same id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if nothing is stored at `path`,
    /// `Error::MalformedEntity` if the object carries no ancestry,
    /// `Error::UnknownType` if its type is not registered here, and
    /// `Error::InvalidPath` if `path` is not a series placement.
    pub fn stored_entity(&mut self, path: &str) -> Result<EntityId> {
        self.ensure_open()?;
        let key = split_path(path)?.join("/");
        if let Some(index) = self
            .entities
            .iter()
            .position(|e| e.as_ref().is_some_and(|e| e.path() == key))
        {
            return Ok(EntityId(index));
        }
        let node = self.store.open_node(&key)?;
        let ancestry = self.store.get_attribute(node, "ancestry").map_err(|_| {
            Error::MalformedEntity {
                path: key.clone(),
                reason: "no ancestry attribute".to_string(),
            }
        })?;
        let type_name = ancestry
            .as_text_list()
            .and_then(<[String]>::last)
            .ok_or_else(|| Error::MalformedEntity {
                path: key.clone(),
                reason: format!("ancestry is not a type list: {ancestry:?}"),
            })?;
        let ty = self.registry.resolve(type_name)?;
        let (parent, name) = key
            .rsplit_once('/')
            .ok_or_else(|| Error::InvalidPath(key.clone()))?;
        let placement: Placement = parent.parse()?;
        let mut entity = Entity::new(name, ty, placement);
        entity.mark_finalized();
        self.entities.push(Some(entity));
        tracing::debug!("registered stored series {key}");
        Ok(EntityId(self.entities.len() - 1))
    }

    /// Convenience handle for one series.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown id.
    pub fn series(&mut self, id: EntityId) -> Result<SeriesMut<'_>> {
        self.entity(id)?;
        Ok(SeriesMut::new(self, id))
    }

    /// Set a field to a direct value.
    ///
    /// # Errors
    ///
    /// See [`Entity::set_field`].
    pub fn set_field(&mut self, id: EntityId, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        self.ensure_open()?;
        self.entity_mut(id)?.set_field(field, value)
    }

    /// Mark an optional field as intentionally omitted.
    ///
    /// # Errors
    ///
    /// See [`Entity::ignore_field`].
    pub fn ignore_field(&mut self, id: EntityId, field: &str) -> Result<()> {
        self.ensure_open()?;
        self.entity_mut(id)?.ignore_field(field)
    }

    /// Add a timed annotation to an annotation series.
    ///
    /// # Errors
    ///
    /// See [`Entity::add_annotation`].
    pub fn add_annotation(&mut self, id: EntityId, text: &str, time: f64) -> Result<()> {
        self.ensure_open()?;
        self.entity_mut(id)?.add_annotation(text, time)
    }

    fn local_target_path(entities: &[Option<Entity>], record: &LinkRecord) -> Option<String> {
        match record.target() {
            LinkTarget::Local(id) => entities
                .get(id.0)
                .and_then(Option::as_ref)
                .map(|e| join_path(&e.path(), record.target_field())),
            LinkTarget::External { .. } => None,
        }
    }

    /// Validate an entity against its type contract and write it.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingRequiredField` if a required field has neither
    /// value nor link, `Error::EntityFinalized` on a repeat, and
    /// `Error::NotFound` if a linked local target has not been finalized.
    pub fn finalize(&mut self, id: EntityId) -> Result<()> {
        self.ensure_open()?;
        let plan = self.entity(id)?.finalize_plan()?;
        for record in plan.links() {
            if let LinkTarget::Local(_) = record.target() {
                let target = Self::local_target_path(&self.entities, record);
                if !target.as_deref().is_some_and(|t| self.store.exists(t)) {
                    return Err(Error::NotFound(format!(
                        "{} {} (finalize '{}' before '{}')",
                        record.target_name(),
                        record.target_field(),
                        record.target_name(),
                        record.source_name()
                    )));
                }
            }
        }
        if self.store.exists(plan.path()) {
            if self.mode == OpenMode::Modify {
                self.store.remove(plan.path())?;
            } else {
                return Err(Error::AlreadyExists(plan.path().to_string()));
            }
        }
        let entities = &self.entities;
        plan.write(&mut self.store, |record| Self::local_target_path(entities, record))?;
        self.entity_mut(id)?.mark_finalized();
        Ok(())
    }

    /// Discard an unfinalized entity.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` if the entity was already written.
    pub fn abandon(&mut self, id: EntityId) -> Result<()> {
        self.ensure_open()?;
        let entity = self.entity(id)?;
        if entity.is_finalized() {
            return Err(Error::EntityFinalized(entity.name().to_string()));
        }
        tracing::debug!("abandoned {}", entity.path());
        self.entities[id.0] = None;
        Ok(())
    }

    // ========================================================================
    // Links
    // ========================================================================

    fn record_target_provenance(
        &mut self,
        target: EntityId,
        key: &'static str,
        entry: String,
    ) -> Result<()> {
        let entity = self.entity(target)?;
        if entity.is_finalized() {
            let node = self.store.open_node(&entity.path())?;
            append_provenance(&mut self.store, node, key, &entry)
        } else {
            self.entity_mut(target)?.push_provenance(key, entry);
            Ok(())
        }
    }

    fn attach_link(&mut self, source: EntityId, record: LinkRecord) -> Result<(&'static str, String)> {
        let key = record.provenance_key();
        let entry = record.provenance();
        let entity = self.entity_mut(source)?;
        entity.set_link(record)?;
        entity.push_provenance(key, entry.clone());
        Ok((key, entry))
    }

    /// Make `field` of `source` share storage with `target_field` of
    /// `target` in this container (hard link). Both entities record the
    /// relationship.
    ///
    /// # Errors
    ///
    /// Returns `Error::CrossPlacementLink` for fields that may not be linked,
    /// `Error::AlreadyLinked` if the source field already has a value, and
    /// `Error::NotFound` if a finalized target lacks the field.
    pub fn link_field(
        &mut self,
        source: EntityId,
        field: &str,
        target: EntityId,
        target_field: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        if source == target {
            return Err(Error::CrossPlacementLink {
                source_field: field.to_string(),
                target_field: target_field.to_string(),
                reason: "an entity cannot link to itself".to_string(),
            });
        }
        let target_entity = self.entity(target)?;
        let target_name = target_entity.name().to_string();
        let target_path = join_path(&target_entity.path(), target_field);
        if target_entity.is_finalized() && !self.store.exists(&target_path) {
            return Err(Error::NotFound(target_path));
        }
        let source_name = self.entity(source)?.name().to_string();
        let record = LinkRecord::new(
            source_name,
            field,
            target_name,
            target_field,
            LinkTarget::Local(target),
        )?;
        let (key, entry) = self.attach_link(source, record)?;
        tracing::debug!("link requested: {entry}");
        self.record_target_provenance(target, key, entry)
    }

    /// Link `field` of `source` to an entity of another open container
    /// (external link, resolved when read).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` if `other` is this container's location,
    /// plus the errors of [`Container::link_field`].
    pub fn link_field_to(
        &mut self,
        source: EntityId,
        field: &str,
        other: &mut Self,
        target: EntityId,
        target_field: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        other.ensure_open()?;
        if LinkKind::between(&self.path, &other.path) == LinkKind::Hard {
            return Err(Error::InvalidPath(format!(
                "{} is this container, use link_field",
                other.path.display()
            )));
        }
        let target_entity = other.entity(target)?;
        let target_name = target_entity.name().to_string();
        let target_path = join_path(&target_entity.path(), target_field);
        let source_name = self.entity(source)?.name().to_string();
        let record = LinkRecord::new(
            source_name,
            field,
            target_name,
            target_field,
            LinkTarget::External {
                container: other.path.clone(),
                path: target_path,
            },
        )?;
        let (key, entry) = self.attach_link(source, record)?;
        tracing::debug!("external link requested: {entry}");
        other.record_target_provenance(target, key, entry)
    }

    /// Link `field` of `source` to a dataset in a container that is not open
    /// here. `internal_path` is the full dataset path, e.g.
    /// `acquisition/timeseries/<name>/data`. Only the local endpoint records
    /// provenance.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` for a malformed path or this container's
    /// own location, plus the errors of [`Container::link_field`].
    pub fn link_field_remote(
        &mut self,
        source: EntityId,
        field: &str,
        container: impl AsRef<Path>,
        internal_path: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        let container = container.as_ref();
        if LinkKind::between(&self.path, container) == LinkKind::Hard {
            return Err(Error::InvalidPath(format!(
                "{} is this container, use link_field",
                container.display()
            )));
        }
        let segments = split_path(internal_path)?;
        let [.., owner, target_field] = segments.as_slice() else {
            return Err(Error::InvalidPath(internal_path.to_string()));
        };
        let source_name = self.entity(source)?.name().to_string();
        let record = LinkRecord::new(
            source_name,
            field,
            *owner,
            target_field,
            LinkTarget::External {
                container: container.to_path_buf(),
                path: segments.join("/"),
            },
        )?;
        let (_, entry) = self.attach_link(source, record)?;
        tracing::debug!("remote link requested: {entry}");
        Ok(())
    }

    // ========================================================================
    // Reference images and metadata
    // ========================================================================

    fn claim(&mut self, path: &str) -> Result<()> {
        if !self.store.exists(path) {
            return Ok(());
        }
        if self.mode == OpenMode::Modify {
            self.store.remove(path)
        } else {
            Err(Error::AlreadyExists(path.to_string()))
        }
    }

    /// Store a reference image at `acquisition/images/<name>`.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` if the image exists (outside modify
    /// mode) or `Error::InvalidPath` for a bad name.
    pub fn create_reference_image(
        &mut self,
        data: impl Into<Value>,
        name: &str,
        format: &str,
        description: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        check_segment(name)?;
        let path = join_path(IMAGES_PATH, name);
        self.claim(&path)?;
        let node = self.store.create_node(IMAGES_PATH)?;
        let id = self.store.write_dataset(node, name, data.into())?;
        self.store.set_attribute(id, "format", Value::from(format))?;
        self.store.set_attribute(id, "description", Value::from(description))?;
        self.store.set_attribute(id, "neurodata_type", Value::from("Image"))?;
        tracing::debug!("stored reference image {path}");
        Ok(())
    }

    fn guard_metadata(&self, key: &MetadataKey) -> Result<()> {
        let (node, field) = key.resolve()?;
        let path = join_path(&node, &field);
        if self.mode == OpenMode::Append && self.store.exists(&path) {
            return Err(Error::AlreadyExists(path));
        }
        Ok(())
    }

    /// Write a metadata value.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMetadataKey` for a bad key and
    /// `Error::AlreadyExists` when overwriting in append mode.
    pub fn set_metadata(&mut self, key: &MetadataKey, value: impl Into<Value>) -> Result<()> {
        self.ensure_open()?;
        self.guard_metadata(key)?;
        metadata::set_metadata(&mut self.store, key, value)
    }

    /// Write a metadata value with dataset attributes.
    ///
    /// # Errors
    ///
    /// Same as [`Container::set_metadata`].
    pub fn set_metadata_with_attributes(&mut self, key: &MetadataKey, value: FieldValue) -> Result<()> {
        self.ensure_open()?;
        self.guard_metadata(key)?;
        metadata::set_metadata_with_attributes(&mut self.store, key, value)
    }

    /// Copy a file into a freeform metadata field.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, plus the errors of
    /// [`Container::set_metadata`].
    pub fn set_metadata_from_file(&mut self, key: &MetadataKey, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        self.guard_metadata(key)?;
        metadata::set_metadata_from_file(&mut self.store, key, path)
    }

    /// Copy a byte stream into a freeform metadata field.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails, plus the errors of
    /// [`Container::set_metadata`].
    pub fn set_metadata_from_reader(&mut self, key: &MetadataKey, reader: impl Read) -> Result<()> {
        self.ensure_open()?;
        self.guard_metadata(key)?;
        metadata::set_metadata_from_reader(&mut self.store, key, reader)
    }

    // ========================================================================
    // Modules and interfaces
    // ========================================================================

    /// Module behind an id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown or abandoned id.
    pub fn module(&self, id: ModuleId) -> Result<&Module> {
        match self.modules.get(id.0) {
            Some(Some(module)) => Ok(module),
            _ => not_found("module", id.0),
        }
    }

    fn module_mut(&mut self, id: ModuleId) -> Result<&mut Module> {
        match self.modules.get_mut(id.0) {
            Some(Some(module)) => Ok(module),
            _ => not_found("module", id.0),
        }
    }

    /// Interface behind an id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown or abandoned id.
    pub fn interface(&self, id: InterfaceId) -> Result<&Interface> {
        match self.interfaces.get(id.0) {
            Some(Some(iface)) => Ok(iface),
            _ => not_found("interface", id.0),
        }
    }

    fn interface_mut(&mut self, id: InterfaceId) -> Result<&mut Interface> {
        match self.interfaces.get_mut(id.0) {
            Some(Some(iface)) => Ok(iface),
            _ => not_found("interface", id.0),
        }
    }

    /// Create a processing module. In modify mode a stored module of the
    /// same name is replaced.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` if the name is taken.
    pub fn create_module(&mut self, name: &str) -> Result<ModuleId> {
        self.ensure_open()?;
        check_segment(name)?;
        if self.modules.iter().flatten().any(|m| m.name() == name) {
            return Err(Error::AlreadyExists(module_path(name)));
        }
        self.claim(&module_path(name))?;
        self.modules.push(Some(Module::new(name)));
        tracing::debug!("created module {name}");
        Ok(ModuleId(self.modules.len() - 1))
    }

    /// Set a module's description attribute.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` after the module is finalized.
    pub fn set_module_description(&mut self, id: ModuleId, description: &str) -> Result<()> {
        self.ensure_open()?;
        self.module_mut(id)?.set_description(description)
    }

    /// Create an interface of type `kind` (e.g. "`UnitTimes`") in a module.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownType` for unknown kinds, `Error::AlreadyExists`
    /// if the module already has one, `Error::EntityFinalized` if the module
    /// is finalized.
    pub fn create_interface(&mut self, module: ModuleId, kind: &str) -> Result<InterfaceId> {
        self.ensure_open()?;
        let kind: InterfaceKind = kind.parse()?;
        let owner = self.module(module)?;
        owner.ensure_open()?;
        let taken = owner
            .interfaces()
            .iter()
            .any(|i| self.interface(*i).is_ok_and(|iface| iface.kind() == kind));
        if taken {
            return Err(Error::AlreadyExists(join_path(&owner.path(), kind.name())));
        }
        let iface = Interface::new(module, owner.name(), kind);
        self.interfaces.push(Some(iface));
        let id = InterfaceId(self.interfaces.len() - 1);
        self.module_mut(module)?.push_interface(id);
        Ok(id)
    }

    fn interface_body(&mut self, id: InterfaceId) -> Result<(InterfaceKind, &mut InterfaceBody)> {
        self.ensure_open()?;
        let iface = self.interface_mut(id)?;
        let kind = iface.kind();
        Ok((kind, iface.body_mut()?))
    }

    /// Records of a `UnitTimes` interface.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` for other interface kinds and
    /// `Error::EntityFinalized` after finalize.
    pub fn unit_times(&mut self, id: InterfaceId) -> Result<&mut UnitTimes> {
        match self.interface_body(id)? {
            (_, InterfaceBody::UnitTimes(units)) => Ok(units),
            (kind, _) => Err(Error::TypeMismatch {
                expected: "UnitTimes".to_string(),
                found: kind.name().to_string(),
            }),
        }
    }

    /// Records of an `ImagingRetinotopy` interface.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` for other interface kinds and
    /// `Error::EntityFinalized` after finalize.
    pub fn retinotopy(&mut self, id: InterfaceId) -> Result<&mut ImagingRetinotopy> {
        match self.interface_body(id)? {
            (_, InterfaceBody::ImagingRetinotopy(maps)) => Ok(maps),
            (kind, _) => Err(Error::TypeMismatch {
                expected: "ImagingRetinotopy".to_string(),
                found: kind.name().to_string(),
            }),
        }
    }

    fn series_group(&mut self, id: InterfaceId) -> Result<&mut SeriesGroup> {
        match self.interface_body(id)? {
            (_, InterfaceBody::SeriesGroup(group)) => Ok(group),
            (kind, _) => Err(Error::TypeMismatch {
                expected: "series interface".to_string(),
                found: kind.name().to_string(),
            }),
        }
    }

    /// Move an unfinalized series into a series interface and finalize it
    /// there.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` if the interface does not accept the
    /// series type, `Error::EntityFinalized` if the series or interface is
    /// already finalized, and the series' own finalize errors (the series
    /// then keeps its previous placement).
    pub fn add_timeseries(&mut self, iface: InterfaceId, series: EntityId) -> Result<()> {
        let entity = self.entity(series)?;
        if entity.is_finalized() {
            return Err(Error::EntityFinalized(entity.name().to_string()));
        }
        let name = entity.name().to_string();
        let ty = self.registry.resolve(entity.entity_type().name())?;
        let previous = entity.placement().clone();
        self.series_group(iface)?.admit(&name, &ty)?;

        let target = self.interface(iface)?;
        let placement = Placement::Interface {
            module: target.module_name().to_string(),
            interface: target.name().to_string(),
        };
        if self.store.exists(&placement.entity_path(&name)) {
            return Err(Error::AlreadyExists(placement.entity_path(&name)));
        }
        self.entity_mut(series)?.relocate(placement)?;
        if let Err(e) = self.finalize(series) {
            self.entity_mut(series)?.relocate(previous)?;
            return Err(e);
        }
        self.series_group(iface)?.push(&name, Member::Owned(series));
        Ok(())
    }

    /// Hard link an already finalized series into a series interface.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the series is not finalized yet and
    /// `Error::TypeMismatch` if the interface does not accept its type.
    pub fn add_timeseries_as_link(&mut self, iface: InterfaceId, series: EntityId) -> Result<()> {
        let entity = self.entity(series)?;
        let path = entity.path();
        if !entity.is_finalized() || !self.store.exists(&path) {
            return Err(Error::NotFound(format!(
                "{path} (finalize the series before linking it)"
            )));
        }
        let name = entity.name().to_string();
        let ty = self.registry.resolve(entity.entity_type().name())?;
        let group = self.series_group(iface)?;
        group.admit(&name, &ty)?;
        group.push(&name, Member::Linked(path));
        Ok(())
    }

    /// Validate and write an interface.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if interface validation fails and
    /// `Error::EntityFinalized` on a repeat.
    pub fn finalize_interface(&mut self, id: InterfaceId) -> Result<()> {
        self.ensure_open()?;
        match self.interfaces.get_mut(id.0) {
            Some(Some(iface)) => iface.finalize(&mut self.store),
            _ => not_found("interface", id.0),
        }
    }

    /// Finalize a module once all its interfaces are finalized.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncompleteModule` naming unfinalized interfaces and
    /// `Error::EntityFinalized` on a repeat.
    pub fn finalize_module(&mut self, id: ModuleId) -> Result<()> {
        self.ensure_open()?;
        let interfaces = &self.interfaces;
        match self.modules.get_mut(id.0) {
            Some(Some(module)) => module.finalize(&mut self.store, |i| {
                interfaces.get(i.0).and_then(Option::as_ref)
            }),
            _ => not_found("module", id.0),
        }
    }

    /// Discard an unfinalized interface.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` if it was already written.
    pub fn abandon_interface(&mut self, id: InterfaceId) -> Result<()> {
        self.ensure_open()?;
        let iface = self.interface(id)?;
        if iface.is_finalized() {
            return Err(Error::EntityFinalized(iface.path()));
        }
        let module = iface.module();
        self.interfaces[id.0] = None;
        self.module_mut(module)?.forget_interface(id);
        Ok(())
    }

    /// Discard an unfinalized module with all its interfaces, including what
    /// finalized interfaces already wrote.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` if the module was already finalized.
    pub fn abandon_module(&mut self, id: ModuleId) -> Result<()> {
        self.ensure_open()?;
        let module = self.module(id)?;
        if module.is_finalized() {
            return Err(Error::EntityFinalized(module.path()));
        }
        let path = module.path();
        for iface in module.interfaces().to_vec() {
            self.interfaces[iface.0] = None;
        }
        if self.store.exists(&path) {
            self.store.remove(&path)?;
        }
        self.modules[id.0] = None;
        tracing::debug!("abandoned module {path}");
        Ok(())
    }

    // ========================================================================
    // Epochs
    // ========================================================================

    /// Create an epoch spanning `[start, stop)` seconds.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRange` for bad bounds or a taken name.
    pub fn create_epoch(&mut self, name: &str, start: f64, stop: f64) -> Result<EpochId> {
        self.ensure_open()?;
        self.epochs.create_epoch(name, start, stop)
    }

    /// Add a tag to an epoch (idempotent).
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown epoch.
    pub fn add_epoch_tag(&mut self, id: EpochId, tag: &str) -> Result<()> {
        self.ensure_open()?;
        self.epochs.add_tag(id, tag)
    }

    /// Set an epoch's description.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown epoch.
    pub fn set_epoch_description(&mut self, id: EpochId, description: &str) -> Result<()> {
        self.ensure_open()?;
        self.epochs.set_description(id, description)
    }

    // ========================================================================
    // Close
    // ========================================================================

    /// Paths of everything still unfinalized.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        let entities = self.live_entities().filter(|e| !e.is_finalized()).map(Entity::path);
        let interfaces = self
            .interfaces
            .iter()
            .flatten()
            .filter(|i| !i.is_finalized())
            .map(Interface::path);
        let modules = self
            .modules
            .iter()
            .flatten()
            .filter(|m| !m.is_finalized())
            .map(Module::path);
        entities.chain(interfaces).chain(modules).collect()
    }

    /// Write epochs and the modification log, then persist the container.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncompleteContainer` while anything is unfinalized
    /// (nothing is written; finalize or abandon and retry),
    /// `Error::ContainerClosed` on a repeat, or an I/O error.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        let pending = self.pending();
        if !pending.is_empty() {
            return Err(Error::IncompleteContainer { pending });
        }
        self.epochs.write(&mut self.store)?;
        self.log.write(&mut self.store)?;
        self.store.save(&self.path)?;
        self.open = false;
        tracing::info!(
            "closed container {} ({} modification entries)",
            self.path.display(),
            self.log.len()
        );
        Ok(())
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!(
                "container {} dropped while open, unsaved changes discarded",
                self.path.display()
            );
        }
    }
}

