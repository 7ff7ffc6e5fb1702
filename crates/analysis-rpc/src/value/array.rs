//! Multi-dimensional numeric arrays exchanged across the RPC boundary.
//!
//! An [`NdArray`] is a shape plus a contiguous, row-major element buffer of
//! a single [`DType`]. The array never computes anything; it only carries
//! values produced by the analysis engine from one process to another.

use crate::{Result, RpcError};

/// Element type of an [`NdArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    pub const ALL: [DType; 7] = [
        DType::Bool,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::Float32,
        DType::Float64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        DType::ALL.into_iter().find(|d| d.as_str() == s)
    }

    /// Size of one element in the wire buffer, in bytes.
    pub fn item_size(&self) -> usize {
        match self {
            DType::Bool | DType::Int8 => 1,
            DType::Int16 => 2,
            DType::Int32 | DType::Float32 => 4,
            DType::Int64 | DType::Float64 => 8,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! le_bytes {
    ($values:expr) => {
        $values.iter().flat_map(|v| v.to_le_bytes()).collect()
    };
}

macro_rules! from_le_chunks {
    ($bytes:expr, $ty:ty, $size:expr) => {
        $bytes
            .chunks_exact($size)
            .map(|chunk| {
                let mut buf = [0u8; $size];
                buf.copy_from_slice(chunk);
                <$ty>::from_le_bytes(buf)
            })
            .collect()
    };
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::Int8(_) => DType::Int8,
            ArrayData::Int16(_) => DType::Int16,
            ArrayData::Int32(_) => DType::Int32,
            ArrayData::Int64(_) => DType::Int64,
            ArrayData::Float32(_) => DType::Float32,
            ArrayData::Float64(_) => DType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::Int8(v) => v.len(),
            ArrayData::Int16(v) => v.len(),
            ArrayData::Int32(v) => v.len(),
            ArrayData::Int64(v) => v.len(),
            ArrayData::Float32(v) => v.len(),
            ArrayData::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage with no elements.
    pub fn empty(dtype: DType) -> Self {
        match dtype {
            DType::Bool => ArrayData::Bool(Vec::new()),
            DType::Int8 => ArrayData::Int8(Vec::new()),
            DType::Int16 => ArrayData::Int16(Vec::new()),
            DType::Int32 => ArrayData::Int32(Vec::new()),
            DType::Int64 => ArrayData::Int64(Vec::new()),
            DType::Float32 => ArrayData::Float32(Vec::new()),
            DType::Float64 => ArrayData::Float64(Vec::new()),
        }
    }

    /// Little-endian element buffer.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            ArrayData::Bool(v) => v.iter().map(|b| u8::from(*b)).collect(),
            ArrayData::Int8(v) => le_bytes!(v),
            ArrayData::Int16(v) => le_bytes!(v),
            ArrayData::Int32(v) => le_bytes!(v),
            ArrayData::Int64(v) => le_bytes!(v),
            ArrayData::Float32(v) => le_bytes!(v),
            ArrayData::Float64(v) => le_bytes!(v),
        }
    }

    /// Rebuild storage from a little-endian element buffer.
    pub fn from_le_bytes(dtype: DType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % dtype.item_size() != 0 {
            return Err(RpcError::decode(format!(
                "{} buffer length {} is not a multiple of {}",
                dtype,
                bytes.len(),
                dtype.item_size()
            )));
        }

        let data = match dtype {
            DType::Bool => ArrayData::Bool(
                bytes
                    .iter()
                    .map(|b| match b {
                        0 => Ok(false),
                        1 => Ok(true),
                        other => Err(RpcError::decode(format!("invalid bool element {}", other))),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            DType::Int8 => ArrayData::Int8(from_le_chunks!(bytes, i8, 1)),
            DType::Int16 => ArrayData::Int16(from_le_chunks!(bytes, i16, 2)),
            DType::Int32 => ArrayData::Int32(from_le_chunks!(bytes, i32, 4)),
            DType::Int64 => ArrayData::Int64(from_le_chunks!(bytes, i64, 8)),
            DType::Float32 => ArrayData::Float32(from_le_chunks!(bytes, f32, 4)),
            DType::Float64 => ArrayData::Float64(from_le_chunks!(bytes, f64, 8)),
        };
        Ok(data)
    }

    /// Element `index` widened to `f64`, for numeric handlers.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            ArrayData::Bool(v) => v.get(index).map(|b| if *b { 1.0 } else { 0.0 }),
            ArrayData::Int8(v) => v.get(index).map(|x| f64::from(*x)),
            ArrayData::Int16(v) => v.get(index).map(|x| f64::from(*x)),
            ArrayData::Int32(v) => v.get(index).map(|x| f64::from(*x)),
            ArrayData::Int64(v) => v.get(index).map(|x| *x as f64),
            ArrayData::Float32(v) => v.get(index).map(|x| f64::from(*x)),
            ArrayData::Float64(v) => v.get(index).copied(),
        }
    }
}

/// A shaped, typed, contiguous numeric array.
///
/// The element count always equals the product of the shape; an empty
/// shape describes a zero-dimensional array holding exactly one element.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Create an array, validating that the shape matches the element count.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(RpcError::Validation {
                field: "shape".to_string(),
                message: format!(
                    "shape {:?} needs {} elements, buffer holds {}",
                    shape,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional float64 array.
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::Float64(values),
        }
    }

    /// One-dimensional array with zero elements.
    pub fn empty(dtype: DType) -> Self {
        Self {
            shape: vec![0],
            data: ArrayData::empty(dtype),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_parts(self) -> (Vec<usize>, ArrayData) {
        (self.shape, self.data)
    }
}

/// Product of the dimension sizes, failing on overflow.
pub fn element_count(shape: &[usize]) -> Result<usize> {
    shape.iter().try_fold(1usize, |acc, dim| {
        acc.checked_mul(*dim).ok_or_else(|| RpcError::Validation {
            field: "shape".to_string(),
            message: format!("shape {:?} overflows element count", shape),
        })
    })
}
