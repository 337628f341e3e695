//! Error types for neurodata-db
//!
//! Validation errors are raised by the call that breaks the contract, never
//! deferred to close. Lifecycle errors abort the open attempt before anything
//! is written.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// neurodata-db error types
#[derive(Error, Debug)]
pub enum Error {
    /// Type name is not in the registry
    #[error("Unknown entity type '{0}'\nRegister the type before creating entities of it")]
    UnknownType(String),

    /// A required field has neither a value nor a link at finalize
    #[error("Entity '{entity}' is missing required field '{field}'")]
    MissingRequiredField {
        /// Entity name
        entity: String,
        /// Field name
        field: String,
    },

    /// Mutation of an entity, interface or module after finalize
    #[error("'{0}' is already finalized and can no longer be modified")]
    EntityFinalized(String),

    /// Field already carries a direct value (or a link) and cannot take another
    #[error("Field '{field}' of '{entity}' already has a value or link")]
    AlreadyLinked {
        /// Entity name
        entity: String,
        /// Field name
        field: String,
    },

    /// Link request between fields whose semantics differ
    #[error("Cannot link '{source_field}' to '{target_field}': {reason}")]
    CrossPlacementLink {
        /// Field on the linking entity
        source_field: String,
        /// Field on the linked entity
        target_field: String,
        /// Why the link is forbidden
        reason: String,
    },

    /// Epoch bounds are invalid or the name is taken
    #[error("Invalid epoch '{name}': {reason}")]
    InvalidRange {
        /// Epoch name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Module finalized while some interface is still open
    #[error("Module '{module}' has unfinalized interfaces: {pending:?}")]
    IncompleteModule {
        /// Module name
        module: String,
        /// Interfaces not yet finalized
        pending: Vec<String>,
    },

    /// Container closed while children are unfinalized
    #[error("Container cannot close, unfinalized objects remain: {pending:?}\nFinalize or abandon them first")]
    IncompleteContainer {
        /// Paths/names of the offending objects
        pending: Vec<String>,
    },

    /// Target already exists
    #[error("'{0}' already exists")]
    AlreadyExists(String),

    /// Target does not exist
    #[error("'{0}' not found")]
    NotFound(String),

    /// `ignore_field` on a required field
    #[error("Field '{field}' is required by '{type_name}' and cannot be ignored")]
    OptionalFieldOnly {
        /// Entity type name
        type_name: String,
        /// Field name
        field: String,
    },

    /// Two mutually exclusive fields were both given values
    #[error("Entity '{entity}' sets both '{first}' and '{second}', only one is allowed")]
    ExclusiveFields {
        /// Entity name
        entity: String,
        /// First field
        first: String,
        /// Second field
        second: String,
    },

    /// Object is not of the expected type family
    #[error("Type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch {
        /// Expected type (or ancestor)
        expected: String,
        /// Actual type
        found: String,
    },

    /// Interface-specific record validation failed
    #[error("Invalid record in interface '{interface}': {reason}")]
    InvalidRecord {
        /// Interface name
        interface: String,
        /// Validation failure
        reason: String,
    },

    /// A value handed to a setter is out of range
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field or parameter name
        field: String,
        /// What is wrong with the value
        reason: String,
    },

    /// Path is syntactically invalid
    #[error("Invalid path '{0}'")]
    InvalidPath(String),

    /// Metadata key template could not be expanded
    #[error("Invalid metadata key '{key}': {reason}")]
    InvalidMetadataKey {
        /// Key template
        key: String,
        /// Expansion failure
        reason: String,
    },

    /// Following an external link failed at read time
    #[error("Cannot resolve link to '{target}' in {container}: {reason}")]
    LinkResolution {
        /// Container holding the link target
        container: String,
        /// Internal path of the link target
        target: String,
        /// Why resolution failed
        reason: String,
    },

    /// Stored object does not satisfy its declared type's contract
    #[error("Malformed entity '{path}': {reason}")]
    MalformedEntity {
        /// Path of the entity
        path: String,
        /// Contract violation
        reason: String,
    },

    /// Operation on a container that was already closed
    #[error("Container '{0}' is closed")]
    ContainerClosed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Container document (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
