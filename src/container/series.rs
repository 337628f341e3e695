//! Series conveniences on top of the generic field API

use crate::entity::{EntityId, FieldValue};
use crate::store::Value;
use crate::{Error, Result};

use super::Container;

/// Mutable handle to one unfinalized series of an open container.
///
/// # Examples
///
/// ```rust,no_run
/// use neurodata_db::container::Container;
/// use neurodata_db::entity::Placement;
///
/// # fn example() -> neurodata_db::Result<()> {
/// let mut container = Container::builder("session.nwb.json")
///     .description("running wheel")
///     .create()?;
/// let id = container.create_timeseries("TimeSeries", "speed", Placement::Acquisition)?;
/// let mut series = container.series(id)?;
/// series.set_data(vec![0.1, 0.4, 0.2], "m/s", 1.0, 0.01)?;
/// series.set_time_by_rate(0.0, 30.0)?;
/// series.set_description("wheel speed")?;
/// series.finalize()?;
/// container.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SeriesMut<'a> {
    container: &'a mut Container,
    id: EntityId,
}

impl<'a> SeriesMut<'a> {
    pub(crate) fn new(container: &'a mut Container, id: EntityId) -> Self {
        Self { container, id }
    }

    /// Entity handle.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Set `data` with its unit, conversion factor and resolution.
    ///
    /// # Errors
    ///
    /// See [`Container::set_field`].
    pub fn set_data(
        &mut self,
        data: impl Into<Value>,
        unit: &str,
        conversion: f64,
        resolution: f64,
    ) -> Result<&mut Self> {
        let value = FieldValue::new(data)
            .with_attribute("unit", unit)
            .with_attribute("conversion", conversion)
            .with_attribute("resolution", resolution);
        self.container.set_field(self.id, "data", value)?;
        Ok(self)
    }

    /// Set explicit sample times in seconds.
    ///
    /// # Errors
    ///
    /// Returns `Error::ExclusiveFields` if `starting_time` is already set.
    pub fn set_time(&mut self, timestamps: impl Into<Value>) -> Result<&mut Self> {
        let value = FieldValue::new(timestamps)
            .with_attribute("unit", "Seconds")
            .with_attribute("interval", 1_i64);
        self.container.set_field(self.id, "timestamps", value)?;
        Ok(self)
    }

    /// Describe sample times by a start time and a sampling rate in Hz.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidValue` for a non-positive or non-finite rate and
    /// `Error::ExclusiveFields` if `timestamps` is already set.
    pub fn set_time_by_rate(&mut self, start: f64, rate: f64) -> Result<&mut Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Error::InvalidValue {
                field: "rate".to_string(),
                reason: format!(
                    "sampling rate of '{}' must be positive, got {rate}",
                    self.container.entity(self.id)?.name()
                ),
            });
        }
        let value = FieldValue::new(start)
            .with_attribute("rate", rate)
            .with_attribute("unit", "Seconds");
        self.container.set_field(self.id, "starting_time", value)?;
        Ok(self)
    }

    /// Mark `data` as intentionally omitted.
    ///
    /// # Errors
    ///
    /// Returns `Error::OptionalFieldOnly` when the type requires data.
    pub fn ignore_data(&mut self) -> Result<&mut Self> {
        self.container.ignore_field(self.id, "data")?;
        Ok(self)
    }

    /// Mark both time representations as intentionally omitted.
    ///
    /// # Errors
    ///
    /// Returns `Error::OptionalFieldOnly` when the type requires timestamps
    /// and `Error::AlreadyLinked` if either field is set. Neither field is
    /// touched on error.
    pub fn ignore_time(&mut self) -> Result<&mut Self> {
        self.container.ensure_open()?;
        self.container
            .entity_mut(self.id)?
            .ignore_fields(&["timestamps", "starting_time"])?;
        Ok(self)
    }

    /// Set any field. Names outside the type contract become custom fields.
    ///
    /// # Errors
    ///
    /// See [`Container::set_field`].
    pub fn set_value(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<&mut Self> {
        self.container.set_field(self.id, field, value)?;
        Ok(self)
    }

    /// Set `description`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` after finalize.
    pub fn set_description(&mut self, description: &str) -> Result<&mut Self> {
        self.set_value("description", description)
    }

    /// Set `comment`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` after finalize.
    pub fn set_comment(&mut self, comment: &str) -> Result<&mut Self> {
        self.set_value("comment", comment)
    }

    /// Set `source`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` after finalize.
    pub fn set_source(&mut self, source: &str) -> Result<&mut Self> {
        self.set_value("source", source)
    }

    /// Add a timed annotation.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` unless the series is an `AnnotationSeries`.
    pub fn add_annotation(&mut self, text: &str, time: f64) -> Result<&mut Self> {
        self.container.add_annotation(self.id, text, time)?;
        Ok(self)
    }

    /// Finalize the series, consuming the handle.
    ///
    /// # Errors
    ///
    /// See [`Container::finalize`].
    pub fn finalize(self) -> Result<()> {
        self.container.finalize(self.id)
    }
}
