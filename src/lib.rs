//! # Neurodata-DB: Schema-Governed Containers for Neurophysiology Time Series
//!
//! **Version**: 0.1.0
//!
//! Neurodata-DB builds hierarchical recording containers in which every
//! object is an instance of a registered type carrying a required/optional
//! field contract. Entities are assembled in memory, validated on finalize,
//! and written through a small storage adapter; the container is persisted
//! atomically on close.
//!
//! ## Design Principles
//!
//! - **Fail at the call**: contract violations surface at the call that
//!   commits them, not at close
//! - **Self-describing output**: every stored entity records its type,
//!   ancestry and the optional fields it omits on purpose
//! - **Shared storage, visible provenance**: linked datasets share storage
//!   and both endpoints name each other
//! - **Append-only history**: every write-mode open extends a monotonic
//!   modification log
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use neurodata_db::container::Container;
//! use neurodata_db::entity::Placement;
//!
//! let mut container = Container::builder("session.nwb.json")
//!     .description("visual stimulation, mouse V1")
//!     .start_time("Sat Jul 04 2015 3:14:16")
//!     .create()?;
//!
//! let notes = container.create_timeseries("AnnotationSeries", "notes", Placement::Acquisition)?;
//! container.add_annotation(notes, "stimulus on", 1.5)?;
//! container.add_annotation(notes, "stimulus off", 3.0)?;
//! container.finalize(notes)?;
//!
//! let epoch = container.create_epoch("trial-1", 0.0, 4.0)?;
//! container.add_epoch_tag(epoch, "grating")?;
//! container.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod container;
pub mod entity;
pub mod epoch;
pub mod error;
pub mod link;
pub mod metadata;
pub mod module;
pub mod reader;
pub mod schema;
pub mod store;

pub use container::{Container, ContainerBuilder, OpenMode};
pub use error::{Error, Result};
pub use reader::ContainerReader;
