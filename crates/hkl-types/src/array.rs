use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Typed element buffer of an [`NdArray`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    Bool(Vec<bool>),
    UInt8(Vec<u8>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl ArrayData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type name, as recorded in the `dtype` attribute.
    pub fn dtype_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::UInt8(_) => "uint8",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
        }
    }
}

/// A dense, row-major, n-dimensional numeric array.
///
/// A zero-dimensional array (empty shape) holds exactly one element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Create an array, checking that `shape` covers exactly `data.len()`
    /// elements.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, TypeError> {
        let expected = shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim));
        if expected != Some(data.len()) {
            return Err(TypeError::ShapeMismatch {
                shape,
                len: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array over `data`.
    pub fn from_vec(data: ArrayData) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    /// The elements as `f64`, widening integer and boolean types.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            ArrayData::Bool(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
            ArrayData::UInt8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::Int32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::Int64(v) => v.iter().map(|&x| x as f64).collect(),
            ArrayData::Float32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::Float64(v) => v.clone(),
        }
    }
}
