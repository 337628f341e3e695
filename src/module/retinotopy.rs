//! `ImagingRetinotopy`: intrinsic signal imaging maps
//!
//! Holds one phase map per visual axis, a power map for the first axis, a
//! sign map, and two raw reference images (vasculature and focal depth).
//! Every map is 2-D and carries its `dimension`; images also carry `format`
//! and `bits_per_pixel`.

use crate::store::{ContainerStore, NdArray, NodeId, Value};
use crate::{Error, Result};

use super::InterfaceData;

const INTERFACE: &str = "ImagingRetinotopy";

/// Visual axis a map belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Primary axis (`axis_1`), the only one with a power map
    First,
    /// Secondary axis (`axis_2`)
    Second,
}

impl Axis {
    const fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PhaseMap {
    map: NdArray,
    description: String,
    field_of_view: [f64; 2],
    unit: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Image {
    data: NdArray,
    bits_per_pixel: u32,
    field_of_view: Option<[f64; 2]>,
    focal_depth: Option<f64>,
}

/// Retinotopy maps of one imaging session.
#[derive(Debug, Clone, Default)]
pub struct ImagingRetinotopy {
    phase: [Option<PhaseMap>; 2],
    power: Option<(NdArray, [f64; 2])>,
    sign: Option<NdArray>,
    vasculature: Option<Image>,
    focal_depth: Option<Image>,
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidRecord {
        interface: INTERFACE.to_string(),
        reason: reason.into(),
    }
}

fn require_2d(what: &str, map: &NdArray) -> Result<()> {
    if map.shape().len() == 2 {
        Ok(())
    } else {
        Err(invalid(format!(
            "{what} must be 2-D, got shape {:?}",
            map.shape()
        )))
    }
}

fn dimension(map: &NdArray) -> Value {
    Value::IntList(
        map.shape()
            .iter()
            .map(|d| i64::try_from(*d).unwrap_or(i64::MAX))
            .collect(),
    )
}

fn fov(field_of_view: [f64; 2]) -> Value {
    Value::FloatList(field_of_view.to_vec())
}

/// Smallest of 8/16/32 bits that holds `max`.
fn bits_for(max: f64) -> Option<u32> {
    [(8, 256.0), (16, 65_536.0), (32, 4_294_967_296.0)]
        .into_iter()
        .find_map(|(bits, limit)| (max < limit).then_some(bits))
}

fn check_pixels(what: &str, data: &NdArray, bits_per_pixel: Option<u32>) -> Result<u32> {
    require_2d(what, data)?;
    if data.data().iter().any(|p| *p < 0.0 || p.fract() != 0.0 || !p.is_finite()) {
        return Err(invalid(format!("{what} pixels must be non-negative integers")));
    }
    let max = data.max().unwrap_or(0.0);
    let needed = bits_for(max).ok_or_else(|| invalid(format!("{what} pixel {max} exceeds 32 bits")))?;
    match bits_per_pixel {
        None => Ok(needed),
        Some(bits) if !matches!(bits, 8 | 16 | 32) => {
            Err(invalid(format!("{what} bits_per_pixel must be 8, 16 or 32, got {bits}")))
        }
        Some(bits) if bits < needed => Err(invalid(format!(
            "{what} pixel {max} does not fit in {bits} bits"
        ))),
        Some(bits) => Ok(bits),
    }
}

impl ImagingRetinotopy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add the phase map of `axis`. `description` names the axis (e.g.
    /// "altitude"); `field_of_view` is `[height, width]`; `unit` is usually
    /// "degrees".
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` if the axis already has a phase map and
    /// `Error::InvalidRecord` if the map is not 2-D.
    pub fn add_phase_map(
        &mut self,
        axis: Axis,
        map: NdArray,
        description: &str,
        field_of_view: [f64; 2],
        unit: &str,
    ) -> Result<()> {
        let slot = &mut self.phase[usize::from(axis.number() - 1)];
        if slot.is_some() {
            return Err(Error::AlreadyExists(format!(
                "{INTERFACE}/axis_{}_phase_map",
                axis.number()
            )));
        }
        require_2d("phase map", &map)?;
        *slot = Some(PhaseMap {
            map,
            description: description.to_string(),
            field_of_view,
            unit: unit.to_string(),
        });
        Ok(())
    }

    /// Add the power map. Only the first axis has one.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` for the second axis or a non 2-D map and
    /// `Error::AlreadyExists` on a repeat.
    pub fn add_power_map(&mut self, axis: Axis, map: NdArray, field_of_view: [f64; 2]) -> Result<()> {
        if axis != Axis::First {
            return Err(invalid("a power map is accepted only for axis 1"));
        }
        if self.power.is_some() {
            return Err(Error::AlreadyExists(format!("{INTERFACE}/axis_1_power_map")));
        }
        require_2d("power map", &map)?;
        self.power = Some((map, field_of_view));
        Ok(())
    }

    /// Add the sign map.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` on a repeat and `Error::InvalidRecord`
    /// if the map is not 2-D.
    pub fn add_sign_map(&mut self, map: NdArray) -> Result<()> {
        if self.sign.is_some() {
            return Err(Error::AlreadyExists(format!("{INTERFACE}/sign_map")));
        }
        require_2d("sign map", &map)?;
        self.sign = Some(map);
        Ok(())
    }

    /// Add the vasculature image. Without `bits_per_pixel` the smallest of
    /// 8, 16 or 32 that holds the brightest pixel is used.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` for invalid pixels or depth and
    /// `Error::AlreadyExists` on a repeat.
    pub fn add_vasculature_image(
        &mut self,
        image: NdArray,
        bits_per_pixel: Option<u32>,
        field_of_view: Option<[f64; 2]>,
    ) -> Result<()> {
        if self.vasculature.is_some() {
            return Err(Error::AlreadyExists(format!("{INTERFACE}/vasculature_image")));
        }
        let bits_per_pixel = check_pixels("vasculature image", &image, bits_per_pixel)?;
        self.vasculature = Some(Image {
            data: image,
            bits_per_pixel,
            field_of_view,
            focal_depth: None,
        });
        Ok(())
    }

    /// Add the focal depth image, optionally with the focal depth in meters.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` for invalid pixels or depth and
    /// `Error::AlreadyExists` on a repeat.
    pub fn add_focal_depth_image(
        &mut self,
        image: NdArray,
        bits_per_pixel: Option<u32>,
        focal_depth: Option<f64>,
    ) -> Result<()> {
        if self.focal_depth.is_some() {
            return Err(Error::AlreadyExists(format!("{INTERFACE}/focal_depth_image")));
        }
        let bits_per_pixel = check_pixels("focal depth image", &image, bits_per_pixel)?;
        self.focal_depth = Some(Image {
            data: image,
            bits_per_pixel,
            field_of_view: None,
            focal_depth,
        });
        Ok(())
    }
}

fn write_image<S: ContainerStore>(store: &mut S, node: NodeId, name: &str, image: &Image) -> Result<()> {
    let id = store.write_dataset(node, name, Value::Array(image.data.clone()))?;
    store.set_attribute(id, "format", Value::from("raw"))?;
    store.set_attribute(id, "dimension", dimension(&image.data))?;
    store.set_attribute(id, "bits_per_pixel", Value::Int(i64::from(image.bits_per_pixel)))?;
    if let Some(field_of_view) = image.field_of_view {
        store.set_attribute(id, "field_of_view", fov(field_of_view))?;
    }
    if let Some(depth) = image.focal_depth {
        store.set_attribute(id, "focal_depth", Value::Float(depth))?;
    }
    Ok(())
}

impl InterfaceData for ImagingRetinotopy {
    fn validate(&self, interface: &str) -> Result<()> {
        let fail = |reason: String| Error::InvalidRecord {
            interface: interface.to_string(),
            reason,
        };
        for axis in [Axis::First, Axis::Second] {
            if self.phase[usize::from(axis.number() - 1)].is_none() {
                return Err(fail(format!("axis_{}_phase_map is missing", axis.number())));
            }
        }
        if let (Some((power, _)), Some(phase)) = (&self.power, &self.phase[0]) {
            if power.shape() != phase.map.shape() {
                return Err(fail(format!(
                    "power map shape {:?} differs from axis 1 phase map {:?}",
                    power.shape(),
                    phase.map.shape()
                )));
            }
        }
        Ok(())
    }

    fn write<S: ContainerStore>(&self, store: &mut S, _path: &str, node: NodeId) -> Result<()> {
        let mut descriptions = Vec::with_capacity(2);
        for (index, phase) in self.phase.iter().enumerate() {
            let Some(phase) = phase else { continue };
            let name = format!("axis_{}_phase_map", index + 1);
            let id = store.write_dataset(node, &name, Value::Array(phase.map.clone()))?;
            store.set_attribute(id, "unit", Value::from(phase.unit.as_str()))?;
            store.set_attribute(id, "dimension", dimension(&phase.map))?;
            store.set_attribute(id, "field_of_view", fov(phase.field_of_view))?;
            descriptions.push(phase.description.clone());
        }
        store.write_dataset(node, "axis_descriptions", Value::TextList(descriptions))?;
        if let Some((power, field_of_view)) = &self.power {
            let id = store.write_dataset(node, "axis_1_power_map", Value::Array(power.clone()))?;
            store.set_attribute(id, "dimension", dimension(power))?;
            store.set_attribute(id, "field_of_view", fov(*field_of_view))?;
        }
        if let Some(sign) = &self.sign {
            let id = store.write_dataset(node, "sign_map", Value::Array(sign.clone()))?;
            store.set_attribute(id, "dimension", dimension(sign))?;
        }
        if let Some(image) = &self.vasculature {
            write_image(store, node, "vasculature_image", image)?;
        }
        if let Some(image) = &self.focal_depth {
            write_image(store, node, "focal_depth_image", image)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn map(rows: &[[f64; 3]; 2]) -> NdArray {
        NdArray::from_rows(rows).unwrap()
    }

    fn complete() -> ImagingRetinotopy {
        let mut iface = ImagingRetinotopy::new();
        iface
            .add_phase_map(Axis::First, map(&[[1.0, 1.1, 1.2], [2.0, 2.1, 2.2]]), "altitude", [0.1, 0.1], "degrees")
            .unwrap();
        iface
            .add_phase_map(Axis::Second, map(&[[3.0, 3.1, 3.2], [4.0, 4.1, 4.2]]), "azimuth", [0.1, 0.1], "degrees")
            .unwrap();
        iface
    }

    #[test]
    fn test_power_map_axis_1_only() {
        let mut iface = complete();
        assert!(matches!(
            iface.add_power_map(Axis::Second, map(&[[0.0; 3]; 2]), [0.1, 0.1]),
            Err(Error::InvalidRecord { .. })
        ));
        iface
            .add_power_map(Axis::First, map(&[[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]), [0.1, 0.1])
            .unwrap();
    }

    #[test]
    fn test_bits_per_pixel_default() {
        assert_eq!(bits_for(144.0), Some(8));
        assert_eq!(bits_for(256.0), Some(16));
        assert_eq!(bits_for(70_000.0), Some(32));
        let mut iface = complete();
        assert!(iface
            .add_vasculature_image(map(&[[1.0, 0.0, 129.0], [2.0, 144.0, 0.0]]), Some(4), None)
            .is_err());
        assert!(iface
            .add_focal_depth_image(map(&[[1.0, -1.0, 0.0], [0.0, 0.0, 0.0]]), None, None)
            .is_err());
    }

    #[test]
    fn test_missing_phase_map_rejected() {
        let mut iface = ImagingRetinotopy::new();
        iface
            .add_phase_map(Axis::First, map(&[[0.0; 3]; 2]), "altitude", [0.1, 0.1], "degrees")
            .unwrap();
        assert!(iface.validate(INTERFACE).is_err());
    }

    #[test]
    fn test_write_attributes() {
        let mut iface = complete();
        iface
            .add_vasculature_image(map(&[[1.0, 0.0, 129.0], [2.0, 144.0, 0.0]]), None, Some([0.22, 0.35]))
            .unwrap();
        iface.validate(INTERFACE).unwrap();
        let mut store = MemoryStore::new();
        let path = "processing/isi/ImagingRetinotopy";
        let node = store.create_node(path).unwrap();
        iface.write(&mut store, path, node).unwrap();

        let phase = format!("{path}/axis_2_phase_map");
        assert_eq!(store.attribute_at(&phase, "dimension").unwrap(), Value::IntList(vec![2, 3]));
        assert_eq!(store.attribute_at(&phase, "unit").unwrap(), Value::from("degrees"));
        let image = format!("{path}/vasculature_image");
        assert_eq!(store.attribute_at(&image, "bits_per_pixel").unwrap(), Value::Int(8));
        assert_eq!(store.attribute_at(&image, "format").unwrap(), Value::from("raw"));
        assert_eq!(
            store
                .read_path(&format!("{path}/axis_descriptions"))
                .unwrap()
                .into_value()
                .unwrap(),
            Value::from(vec!["altitude", "azimuth"])
        );
        assert!(!store.exists(&format!("{path}/axis_2_power_map")));
    }
}
