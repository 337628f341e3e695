//! Values stored in datasets and attributes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Dense n-dimensional float array (row-major).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredArray", into = "StoredArray")]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// On-disk form of [`NdArray`]; loading goes back through the shape check.
#[derive(Serialize, Deserialize)]
struct StoredArray {
    shape: Vec<usize>,
    #[serde(with = "float_repr::list")]
    data: Vec<f64>,
}

impl From<NdArray> for StoredArray {
    fn from(array: NdArray) -> Self {
        Self {
            shape: array.shape,
            data: array.data,
        }
    }
}

impl TryFrom<StoredArray> for NdArray {
    type Error = Error;

    fn try_from(stored: StoredArray) -> Result<Self> {
        Self::new(stored.shape, stored.data)
    }
}

impl NdArray {
    /// Create an array from a shape and row-major data.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` when the data length does not match the
    /// product of the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::InvalidRecord {
                interface: "array".to_string(),
                reason: format!(
                    "shape {shape:?} needs {expected} elements, got {}",
                    data.len()
                ),
            });
        }
        Ok(Self { shape, data })
    }

    /// Build a 2-D array from rows. All rows must have the same length.
    ///
    /// # Errors
    ///
    /// Returns error if the rows are ragged.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::InvalidRecord {
                    interface: "array".to_string(),
                    reason: format!("row {i} has {} columns, expected {cols}", row.len()),
                });
            }
            data.extend_from_slice(row);
        }
        Self::new(vec![rows.len(), cols], data)
    }

    /// Array dimensions.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Row-major elements.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Element at a 2-D position, if the array is 2-D and the index is in range.
    #[must_use]
    pub fn get2(&self, row: usize, col: usize) -> Option<f64> {
        match self.shape.as_slice() {
            [rows, cols] if row < *rows && col < *cols => Some(self.data[row * cols + col]),
            _ => None,
        }
    }

    /// Largest element, or `None` for an empty array.
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }
}

/// A dataset or attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Single string
    Text(String),
    /// List of strings
    TextList(Vec<String>),
    /// Single integer
    Int(i64),
    /// List of integers
    IntList(Vec<i64>),
    /// Single float
    Float(#[serde(with = "float_repr")] f64),
    /// List of floats
    FloatList(#[serde(with = "float_repr::list")] Vec<f64>),
    /// N-dimensional float array
    Array(NdArray),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// List of UTC timestamps
    Times(Vec<DateTime<Utc>>),
}

impl Value {
    /// Number of samples along the first dimension (1 for scalars).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(_) | Self::Int(_) | Self::Float(_) => 1,
            Self::TextList(v) => v.len(),
            Self::IntList(v) => v.len(),
            Self::FloatList(v) => v.len(),
            Self::Array(a) => a.shape().first().copied().unwrap_or(0),
            Self::Bytes(v) => v.len(),
            Self::Times(v) => v.len(),
        }
    }

    /// True when the value holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as a string.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a string list.
    #[must_use]
    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            Self::TextList(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric samples as floats (integers are widened).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_floats(&self) -> Option<Vec<f64>> {
        match self {
            Self::Float(f) => Some(vec![*f]),
            Self::Int(i) => Some(vec![*i as f64]),
            Self::FloatList(v) => Some(v.clone()),
            Self::IntList(v) => Some(v.iter().map(|i| *i as f64).collect()),
            Self::Array(a) => Some(a.data().to_vec()),
            _ => None,
        }
    }

    /// Borrow as a timestamp list.
    #[must_use]
    pub fn as_times(&self) -> Option<&[DateTime<Utc>]> {
        match self {
            Self::Times(v) => Some(v),
            _ => None,
        }
    }

    /// True when the stored text, or any element of a text list, contains `needle`.
    #[must_use]
    pub fn contains_text(&self, needle: &str) -> bool {
        match self {
            Self::Text(s) => s.contains(needle),
            Self::TextList(v) => v.iter().any(|s| s.contains(needle)),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::TextList(value)
    }
}

impl From<Vec<&str>> for Value {
    fn from(value: Vec<&str>) -> Self {
        Self::TextList(value.into_iter().map(str::to_string).collect())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<i64>> for Value {
    fn from(value: Vec<i64>) -> Self {
        Self::IntList(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Self::FloatList(value)
    }
}

impl From<&[f64]> for Value {
    fn from(value: &[f64]) -> Self {
        Self::FloatList(value.to_vec())
    }
}

impl From<NdArray> for Value {
    fn from(value: NdArray) -> Self {
        Self::Array(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<DateTime<Utc>>> for Value {
    fn from(value: Vec<DateTime<Utc>>) -> Self {
        Self::Times(value)
    }
}

/// JSON has no NaN or infinities, so floats are written as numbers when
/// finite and as the strings `"NaN"`, `"inf"` and `"-inf"` otherwise.
mod float_repr {
    use std::fmt;

    use serde::de::{self, Deserializer, Unexpected, Visitor};
    use serde::{Deserialize, Serialize, Serializer};

    #[derive(Clone, Copy)]
    pub(super) struct Sample(pub(super) f64);

    impl Serialize for Sample {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self.0 {
                v if v.is_nan() => serializer.serialize_str("NaN"),
                v if v.is_infinite() && v > 0.0 => serializer.serialize_str("inf"),
                v if v.is_infinite() => serializer.serialize_str("-inf"),
                v => serializer.serialize_f64(v),
            }
        }
    }

    struct SampleVisitor;

    impl Visitor<'_> for SampleVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                _ => Err(E::invalid_value(Unexpected::Str(v), &self)),
            }
        }
    }

    impl<'de> Deserialize<'de> for Sample {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(SampleVisitor).map(Sample)
        }
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub(super) fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Sample(*value).serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Sample::deserialize(deserializer).map(|s| s.0)
    }

    pub(super) mod list {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::Sample;

        pub(in crate::store::value) fn serialize<S: Serializer>(
            values: &[f64],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(values.iter().map(|v| Sample(*v)))
        }

        pub(in crate::store::value) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<f64>, D::Error> {
            Vec::<Sample>::deserialize(deserializer).map(|v| v.into_iter().map(|s| s.0).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_shape() {
        let arr = NdArray::from_rows(&[[1.0, 1.1, 1.2], [2.0, 2.1, 2.2]]).unwrap();
        assert_eq!(arr.shape(), &[2, 3]);
        assert_eq!(arr.get2(1, 1), Some(2.1));
        assert_eq!(arr.get2(2, 0), None);
    }

    #[test]
    fn test_from_rows_ragged() {
        let rows: Vec<Vec<f64>> = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(NdArray::from_rows(&rows).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(NdArray::new(vec![2, 2, 2], vec![0.0; 7]).is_err());
        assert!(NdArray::new(vec![2, 2, 3], vec![0.0; 12]).is_ok());
    }

    #[test]
    fn test_value_len() {
        assert_eq!(Value::from(vec![1.0, 2.0, 3.0]).len(), 3);
        assert_eq!(Value::from("x").len(), 1);
        assert!(Value::TextList(vec![]).is_empty());
    }

    #[test]
    fn test_contains_text() {
        let v = Value::from(vec!["a -> b", "c -> d"]);
        assert!(v.contains_text("c"));
        assert!(!v.contains_text("e"));
        assert!(!Value::Int(3).contains_text("3"));
    }

    #[test]
    fn test_non_finite_floats_survive_json() {
        let values = vec![
            Value::Float(f64::NAN),
            Value::FloatList(vec![1.5, f64::INFINITY, f64::NEG_INFINITY, 2.0]),
            Value::Array(NdArray::new(vec![1, 2], vec![f64::NAN, 3.0]).unwrap()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert!(json.contains(r#""NaN""#) && json.contains(r#""-inf""#));
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();

        assert!(matches!(back[0], Value::Float(f) if f.is_nan()));
        let list = back[1].to_floats().unwrap();
        assert_eq!(list[0], 1.5);
        assert_eq!(list[1], f64::INFINITY);
        assert_eq!(list[2], f64::NEG_INFINITY);
        let Value::Array(arr) = &back[2] else {
            panic!("expected array, got {:?}", back[2]);
        };
        assert_eq!(arr.shape(), &[1, 2]);
        assert!(arr.data()[0].is_nan());
        assert_eq!(arr.get2(0, 1), Some(3.0));
    }

    #[test]
    fn test_float_json_rejects_unknown_text() {
        let json = r#"{"type":"float","value":"infinity"}"#;
        assert!(serde_json::from_str::<Value>(json).is_err());
        let json = r#"{"type":"float","value":2}"#;
        assert_eq!(serde_json::from_str::<Value>(json).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_array_json_checks_shape() {
        let json = r#"{"type":"array","value":{"shape":[2,2],"data":[1.0,2.0,3.0]}}"#;
        assert!(serde_json::from_str::<Value>(json).is_err());
        let json = r#"{"type":"array","value":{"shape":[1,3],"data":[1.0,2.0,3.0]}}"#;
        let Value::Array(arr) = serde_json::from_str::<Value>(json).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(arr.get2(0, 2), Some(3.0));
    }

    #[test]
    fn test_value_json_tagged() {
        let json = serde_json::to_string(&Value::Int(7)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":7}"#);
    }
}
