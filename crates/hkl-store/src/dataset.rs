use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Element type of a dataset payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Bool,
    UInt8,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Pairs of little-endian `f64` (real, imaginary).
    Complex128,
    /// A single UTF-8 string.
    Utf8,
    /// Uninterpreted bytes.
    Opaque,
}

impl DType {
    /// Width of one element in bytes, or `None` for variable-length types.
    pub fn item_size(self) -> Option<usize> {
        match self {
            DType::Bool | DType::UInt8 => Some(1),
            DType::Int32 | DType::Float32 => Some(4),
            DType::Int64 | DType::Float64 => Some(8),
            DType::Complex128 => Some(16),
            DType::Utf8 | DType::Opaque => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::UInt8 => "uint8",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex128 => "complex128",
            DType::Utf8 => "utf8",
            DType::Opaque => "opaque",
        }
    }
}

/// A fixed-size element that can be stored in a dataset.
pub trait Element: Sized + Copy {
    const DTYPE: DType;

    fn write_le(self, out: &mut Vec<u8>);

    /// Decode one element from exactly `DTYPE.item_size()` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! numeric_element {
    ($ty:ty, $dtype:expr, $n:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; $n];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

numeric_element!(u8, DType::UInt8, 1);
numeric_element!(i32, DType::Int32, 4);
numeric_element!(i64, DType::Int64, 8);
numeric_element!(f32, DType::Float32, 4);
numeric_element!(f64, DType::Float64, 8);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(u8::from(self));
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl Element for [f64; 2] {
    const DTYPE: DType = DType::Complex128;

    fn write_le(self, out: &mut Vec<u8>) {
        self[0].write_le(out);
        self[1].write_le(out);
    }

    fn read_le(bytes: &[u8]) -> Self {
        [f64::read_le(&bytes[..8]), f64::read_le(&bytes[8..])]
    }
}

fn checked_element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// A data node payload: element type, shape and little-endian bytes.
///
/// A scalar has an empty shape and one element. `Utf8` and `Opaque`
/// payloads are one-dimensional over their byte length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl Dataset {
    /// Build a dataset, checking the payload size against dtype and shape.
    pub fn new(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> StoreResult<Self> {
        let dataset = Self { dtype, shape, data };
        dataset.validate()?;
        Ok(dataset)
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        match self.dtype.item_size() {
            Some(size) => {
                let expected = checked_element_count(&self.shape)
                    .and_then(|count| count.checked_mul(size))
                    .ok_or_else(|| {
                        StoreError::InvalidDataset(format!(
                            "{} dataset shape {:?} overflows the address space",
                            self.dtype.name(),
                            self.shape
                        ))
                    })?;
                if self.data.len() != expected {
                    return Err(StoreError::InvalidDataset(format!(
                        "{} dataset with shape {:?} needs {expected} bytes, got {}",
                        self.dtype.name(),
                        self.shape,
                        self.data.len()
                    )));
                }
            }
            None => {
                if self.shape != [self.data.len()] {
                    return Err(StoreError::InvalidDataset(format!(
                        "{} dataset must be one-dimensional over its {} bytes, got shape {:?}",
                        self.dtype.name(),
                        self.data.len(),
                        self.shape
                    )));
                }
                if self.dtype == DType::Utf8 && std::str::from_utf8(&self.data).is_err() {
                    return Err(StoreError::InvalidDataset("utf8 dataset is not valid UTF-8".into()));
                }
            }
        }
        Ok(())
    }

    /// A zero-length opaque dataset.
    pub fn empty() -> Self {
        Self {
            dtype: DType::Opaque,
            shape: vec![0],
            data: Vec::new(),
        }
    }

    pub fn utf8(s: &str) -> Self {
        Self {
            dtype: DType::Utf8,
            shape: vec![s.len()],
            data: s.as_bytes().to_vec(),
        }
    }

    pub fn opaque(bytes: Vec<u8>) -> Self {
        Self {
            dtype: DType::Opaque,
            shape: vec![bytes.len()],
            data: bytes,
        }
    }

    /// A zero-dimensional dataset holding one element.
    pub fn scalar<T: Element>(value: T) -> Self {
        let mut data = Vec::new();
        value.write_le(&mut data);
        Self {
            dtype: T::DTYPE,
            shape: Vec::new(),
            data,
        }
    }

    /// An n-dimensional dataset over `values` in row-major order.
    pub fn from_elements<T: Element>(shape: Vec<usize>, values: &[T]) -> StoreResult<Self> {
        let mut data = Vec::with_capacity(values.len() * T::DTYPE.item_size().unwrap_or(1));
        for &v in values {
            v.write_le(&mut data);
        }
        Self::new(T::DTYPE, shape, data)
    }

    /// One-dimensional dataset over `values`.
    pub fn from_slice<T: Element>(values: &[T]) -> Self {
        let mut data = Vec::new();
        for &v in values {
            v.write_le(&mut data);
        }
        Self {
            dtype: T::DTYPE,
            shape: vec![values.len()],
            data,
        }
    }

    /// Decode the payload as elements of `T`. Fails if the dtype differs.
    pub fn to_elements<T: Element>(&self) -> StoreResult<Vec<T>> {
        if self.dtype != T::DTYPE {
            return Err(StoreError::InvalidDataset(format!(
                "expected {} dataset, found {}",
                T::DTYPE.name(),
                self.dtype.name()
            )));
        }
        let size = T::DTYPE.item_size().unwrap_or(1);
        Ok(self.data.chunks_exact(size).map(T::read_le).collect())
    }

    /// Decode a zero-dimensional dataset.
    pub fn to_scalar<T: Element>(&self) -> StoreResult<T> {
        if !self.shape.is_empty() {
            return Err(StoreError::InvalidDataset(format!(
                "expected scalar, found shape {:?}",
                self.shape
            )));
        }
        self.to_elements::<T>()?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidDataset("scalar dataset is empty".into()))
    }

    /// The payload as a string, for `Utf8` datasets.
    pub fn as_str(&self) -> StoreResult<&str> {
        if self.dtype != DType::Utf8 {
            return Err(StoreError::InvalidDataset(format!(
                "expected utf8 dataset, found {}",
                self.dtype.name()
            )));
        }
        std::str::from_utf8(&self.data)
            .map_err(|e| StoreError::InvalidDataset(format!("invalid UTF-8: {e}")))
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements (`1` for scalars). Saturates for shapes that
    /// failed validation.
    pub fn element_count(&self) -> usize {
        checked_element_count(&self.shape).unwrap_or(usize::MAX)
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }

    /// Raw little-endian payload.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_have_empty_shape() {
        let d = Dataset::scalar(42i64);
        assert!(d.is_scalar());
        assert_eq!(d.element_count(), 1);
        assert_eq!(d.to_scalar::<i64>().unwrap(), 42);
        assert!(d.to_scalar::<f64>().is_err());
    }

    #[test]
    fn complex_scalar() {
        let d = Dataset::scalar([1.5f64, -2.0]);
        assert_eq!(d.dtype(), DType::Complex128);
        assert_eq!(d.bytes().len(), 16);
        assert_eq!(d.to_scalar::<[f64; 2]>().unwrap(), [1.5, -2.0]);
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let err = Dataset::new(DType::Int64, vec![usize::MAX, 2], Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDataset(ref m) if m.contains("overflows")));
        let err = Dataset::new(DType::Int64, vec![usize::MAX / 4], Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDataset(_)));
    }

    #[test]
    fn shaped_elements() {
        let d = Dataset::from_elements(vec![2, 2], &[1i32, 2, 3, 4]).unwrap();
        assert_eq!(d.shape(), &[2, 2]);
        assert_eq!(d.to_elements::<i32>().unwrap(), vec![1, 2, 3, 4]);
        assert!(Dataset::from_elements(vec![3], &[1i32, 2]).is_err());
    }

    #[test]
    fn strings_and_blobs() {
        let s = Dataset::utf8("héllo");
        assert_eq!(s.as_str().unwrap(), "héllo");
        let b = Dataset::opaque(vec![0, 1, 2]);
        assert!(b.as_str().is_err());
        assert_eq!(b.bytes(), &[0, 1, 2]);
        assert!(Dataset::new(DType::Utf8, vec![2], vec![0xff, 0xfe]).is_err());
    }

    #[test]
    fn empty_is_empty() {
        assert!(Dataset::empty().is_empty());
        assert!(Dataset::from_slice::<f64>(&[]).is_empty());
        assert!(!Dataset::scalar(false).is_empty());
    }

    #[test]
    fn bools_decode() {
        let d = Dataset::from_slice(&[true, false, true]);
        assert_eq!(d.to_elements::<bool>().unwrap(), vec![true, false, true]);
    }
}
