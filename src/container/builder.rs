//! Container builder: open settings and the three open modes

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::clock::{create_identifier, Clock, SystemClock};
use super::{Container, OpenMode};
use crate::schema::TypeRegistry;
use crate::{Error, Result};

/// Serializable session settings used by [`ContainerBuilder::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// Unique identifier; derived from the description when absent
    pub identifier: Option<String>,
    /// Session description (required for create)
    pub description: Option<String>,
    /// Session start time as free text; the open time when absent
    pub start_time: Option<String>,
    /// Replace an existing container on create
    pub overwrite: bool,
}

/// Builder for opening a [`Container`].
///
/// # Examples
///
/// ```rust,no_run
/// use neurodata_db::container::Container;
///
/// # fn example() -> neurodata_db::Result<()> {
/// let mut container = Container::builder("session.nwb.json")
///     .description("two-photon imaging session")
///     .start_time("Sat Jul 04 2015 3:14:16")
///     .overwrite(true)
///     .create()?;
/// container.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ContainerBuilder {
    path: PathBuf,
    settings: ContainerSettings,
    clock: Arc<dyn Clock>,
    registry: Arc<TypeRegistry>,
}

impl ContainerBuilder {
    /// Builder for the container stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settings: ContainerSettings::default(),
            clock: Arc::new(SystemClock),
            registry: TypeRegistry::global(),
        }
    }

    /// Set the container identifier.
    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.settings.identifier = Some(identifier.into());
        self
    }

    /// Set the session description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.settings.description = Some(description.into());
        self
    }

    /// Set the session start time (stored verbatim).
    #[must_use]
    pub fn start_time(mut self, start_time: impl Into<String>) -> Self {
        self.settings.start_time = Some(start_time.into());
        self
    }

    /// Allow `create` to replace an existing container.
    #[must_use]
    pub const fn overwrite(mut self, overwrite: bool) -> Self {
        self.settings.overwrite = overwrite;
        self
    }

    /// Use all settings from a serialized configuration.
    #[must_use]
    pub fn settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the clock used for the modification log.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the type registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Create a new container.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` if the container exists and overwrite
    /// was not requested, `Error::MissingRequiredField` without a
    /// description.
    pub fn create(self) -> Result<Container> {
        if self.path.exists() && !self.settings.overwrite {
            return Err(Error::AlreadyExists(self.path.display().to_string()));
        }
        let description = self.settings.description.clone().ok_or_else(|| {
            Error::MissingRequiredField {
                entity: self.path.display().to_string(),
                field: "session_description".to_string(),
            }
        })?;
        let identifier = self
            .settings
            .identifier
            .clone()
            .unwrap_or_else(|| create_identifier(&description));
        Container::create_new(
            self.path,
            &identifier,
            &description,
            self.settings.start_time.as_deref(),
            self.clock,
            self.registry,
        )
    }

    /// Open an existing container to add new objects.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the container does not exist.
    pub fn append(self) -> Result<Container> {
        Container::open_existing(self.path, OpenMode::Append, self.clock, self.registry)
    }

    /// Open an existing container to add or replace objects.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the container does not exist.
    pub fn modify(self) -> Result<Container> {
        Container::open_existing(self.path, OpenMode::Modify, self.clock, self.registry)
    }
}
