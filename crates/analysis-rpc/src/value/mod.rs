//! Logical values exchanged across the RPC boundary.
//!
//! [`LogicalValue`] is the in-memory form of every argument and result. The
//! flattener turns it into a [`WireNode`](crate::wire::WireNode) and back.
//! An absent value is never a bare null: [`LogicalValue::TypedNull`] keeps
//! the declared kind so the receiver can rebuild a correctly typed empty value.

pub mod array;
pub mod roi;

pub use array::{ArrayData, DType, NdArray};
pub use roi::{CircleRoi, LinearRoi, PointRoi, RectRoi, Roi, RoiKind, SectorRoi, SectorSymmetry};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Primitive scalar values.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Untyped nil.
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Exception descriptor: kind name, message and an optional nested cause.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExceptionInfo {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ExceptionInfo>>,
}

impl ExceptionInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: ExceptionInfo) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl std::fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by {})", cause)?;
        }
        Ok(())
    }
}

/// Declared type of a typed null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    Sequence,
    Mapping,
    Array(DType),
    Roi(RoiKind),
    Binary,
    Uuid,
    Exception,
}

impl ValueKind {
    /// Stable string tag carried in `typed_null` wire nodes.
    pub fn tag(&self) -> String {
        match self {
            ValueKind::Bool => "bool".to_string(),
            ValueKind::Int => "int".to_string(),
            ValueKind::Float => "float".to_string(),
            ValueKind::Str => "string".to_string(),
            ValueKind::Sequence => "sequence".to_string(),
            ValueKind::Mapping => "mapping".to_string(),
            ValueKind::Array(dtype) => format!("array:{}", dtype),
            ValueKind::Roi(kind) => kind.tag().to_string(),
            ValueKind::Binary => "binary".to_string(),
            ValueKind::Uuid => "uuid".to_string(),
            ValueKind::Exception => "exception".to_string(),
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        if let Some(dtype) = tag.strip_prefix("array:") {
            return DType::from_str(dtype).map(ValueKind::Array);
        }
        if let Some(kind) = RoiKind::from_tag(tag) {
            return Some(ValueKind::Roi(kind));
        }
        match tag {
            "bool" => Some(ValueKind::Bool),
            "int" => Some(ValueKind::Int),
            "float" => Some(ValueKind::Float),
            "string" => Some(ValueKind::Str),
            "sequence" => Some(ValueKind::Sequence),
            "mapping" => Some(ValueKind::Mapping),
            "binary" => Some(ValueKind::Binary),
            "uuid" => Some(ValueKind::Uuid),
            "exception" => Some(ValueKind::Exception),
            _ => None,
        }
    }

    /// The zero value of this kind.
    pub fn empty_value(&self) -> LogicalValue {
        match self {
            ValueKind::Bool => LogicalValue::Scalar(Scalar::Bool(false)),
            ValueKind::Int => LogicalValue::Scalar(Scalar::Int(0)),
            ValueKind::Float => LogicalValue::Scalar(Scalar::Float(0.0)),
            ValueKind::Str => LogicalValue::Scalar(Scalar::Str(String::new())),
            ValueKind::Sequence => LogicalValue::Sequence(Vec::new()),
            ValueKind::Mapping => LogicalValue::Mapping(BTreeMap::new()),
            ValueKind::Array(dtype) => LogicalValue::Array(NdArray::empty(*dtype)),
            ValueKind::Roi(kind) => LogicalValue::Roi(kind.default_roi()),
            ValueKind::Binary => LogicalValue::Binary(Bytes::new()),
            ValueKind::Uuid => LogicalValue::Uuid(Uuid::nil()),
            ValueKind::Exception => LogicalValue::Exception(ExceptionInfo::default()),
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Any value exchanged across the RPC boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalValue {
    Scalar(Scalar),
    Sequence(Vec<LogicalValue>),
    Mapping(BTreeMap<String, LogicalValue>),
    Array(NdArray),
    Roi(Roi),
    /// Absent value that remembers its declared kind.
    TypedNull(ValueKind),
    Binary(Bytes),
    Uuid(Uuid),
    Exception(ExceptionInfo),
}

impl LogicalValue {
    pub fn none() -> Self {
        LogicalValue::Scalar(Scalar::None)
    }

    pub fn typed_null(kind: ValueKind) -> Self {
        LogicalValue::TypedNull(kind)
    }

    /// Kind of this value, or `None` for an untyped nil.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            LogicalValue::Scalar(Scalar::None) => None,
            LogicalValue::Scalar(Scalar::Bool(_)) => Some(ValueKind::Bool),
            LogicalValue::Scalar(Scalar::Int(_)) => Some(ValueKind::Int),
            LogicalValue::Scalar(Scalar::Float(_)) => Some(ValueKind::Float),
            LogicalValue::Scalar(Scalar::Str(_)) => Some(ValueKind::Str),
            LogicalValue::Sequence(_) => Some(ValueKind::Sequence),
            LogicalValue::Mapping(_) => Some(ValueKind::Mapping),
            LogicalValue::Array(array) => Some(ValueKind::Array(array.dtype())),
            LogicalValue::Roi(roi) => Some(ValueKind::Roi(roi.kind())),
            LogicalValue::TypedNull(kind) => Some(*kind),
            LogicalValue::Binary(_) => Some(ValueKind::Binary),
            LogicalValue::Uuid(_) => Some(ValueKind::Uuid),
            LogicalValue::Exception(_) => Some(ValueKind::Exception),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            LogicalValue::Scalar(Scalar::None) | LogicalValue::TypedNull(_)
        )
    }

    /// Replace a typed null with the empty value of its declared kind.
    pub fn or_empty(self) -> Self {
        match self {
            LogicalValue::TypedNull(kind) => kind.empty_value(),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LogicalValue::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LogicalValue::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LogicalValue::Scalar(Scalar::Float(f)) => Some(*f),
            LogicalValue::Scalar(Scalar::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LogicalValue::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            LogicalValue::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[LogicalValue]> {
        match self {
            LogicalValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, LogicalValue>> {
        match self {
            LogicalValue::Mapping(map) => Some(map),
            _ => None,
        }
    }
}

impl From<Scalar> for LogicalValue {
    fn from(scalar: Scalar) -> Self {
        LogicalValue::Scalar(scalar)
    }
}

impl From<bool> for LogicalValue {
    fn from(b: bool) -> Self {
        LogicalValue::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for LogicalValue {
    fn from(i: i64) -> Self {
        LogicalValue::Scalar(Scalar::Int(i))
    }
}

impl From<i32> for LogicalValue {
    fn from(i: i32) -> Self {
        LogicalValue::Scalar(Scalar::Int(i64::from(i)))
    }
}

impl From<f64> for LogicalValue {
    fn from(f: f64) -> Self {
        LogicalValue::Scalar(Scalar::Float(f))
    }
}

impl From<&str> for LogicalValue {
    fn from(s: &str) -> Self {
        LogicalValue::Scalar(Scalar::Str(s.to_string()))
    }
}

impl From<String> for LogicalValue {
    fn from(s: String) -> Self {
        LogicalValue::Scalar(Scalar::Str(s))
    }
}

impl From<Vec<LogicalValue>> for LogicalValue {
    fn from(items: Vec<LogicalValue>) -> Self {
        LogicalValue::Sequence(items)
    }
}

impl From<BTreeMap<String, LogicalValue>> for LogicalValue {
    fn from(map: BTreeMap<String, LogicalValue>) -> Self {
        LogicalValue::Mapping(map)
    }
}

impl From<NdArray> for LogicalValue {
    fn from(array: NdArray) -> Self {
        LogicalValue::Array(array)
    }
}

impl From<Roi> for LogicalValue {
    fn from(roi: Roi) -> Self {
        LogicalValue::Roi(roi)
    }
}

impl From<Bytes> for LogicalValue {
    fn from(bytes: Bytes) -> Self {
        LogicalValue::Binary(bytes)
    }
}

impl From<Vec<u8>> for LogicalValue {
    fn from(bytes: Vec<u8>) -> Self {
        LogicalValue::Binary(Bytes::from(bytes))
    }
}

impl From<Uuid> for LogicalValue {
    fn from(id: Uuid) -> Self {
        LogicalValue::Uuid(id)
    }
}

impl From<ExceptionInfo> for LogicalValue {
    fn from(info: ExceptionInfo) -> Self {
        LogicalValue::Exception(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind_tags_roundtrip() {
        let kinds = [
            ValueKind::Bool,
            ValueKind::Int,
            ValueKind::Float,
            ValueKind::Str,
            ValueKind::Sequence,
            ValueKind::Mapping,
            ValueKind::Array(DType::Int16),
            ValueKind::Roi(RoiKind::Sector),
            ValueKind::Binary,
            ValueKind::Uuid,
            ValueKind::Exception,
        ];
        for kind in kinds {
            assert_eq!(ValueKind::from_tag(&kind.tag()), Some(kind), "{}", kind);
        }
        assert_eq!(ValueKind::from_tag("array:complex64"), None);
        assert_eq!(ValueKind::from_tag("dataset"), None);
    }

    #[test]
    fn test_empty_value_has_declared_kind() {
        let kind = ValueKind::Array(DType::Float32);
        let empty = kind.empty_value();
        assert_eq!(empty.kind(), Some(kind));
        assert_eq!(empty.as_array().unwrap().shape(), &[0]);

        assert_eq!(ValueKind::Str.empty_value(), LogicalValue::from(""));
    }

    #[test]
    fn test_typed_null_or_empty() {
        let null = LogicalValue::typed_null(ValueKind::Mapping);
        assert!(null.is_null());
        assert_eq!(null.kind(), Some(ValueKind::Mapping));
        assert_eq!(null.or_empty(), LogicalValue::Mapping(BTreeMap::new()));
        assert_eq!(LogicalValue::none().kind(), None);
    }

    #[test]
    fn test_exception_display_includes_cause() {
        let info = ExceptionInfo::new("RuntimeError", "fit failed")
            .with_cause(ExceptionInfo::new("ValueError", "singular matrix"));
        assert_eq!(
            info.to_string(),
            "RuntimeError: fit failed (caused by ValueError: singular matrix)"
        );
    }
}
