//! Codecs for the built-in kinds.

use super::{TypeCodec, TypeRegistry};
use crate::flatten::{DecodeCx, EncodeCx};
use crate::value::{
    ArrayData, DType, ExceptionInfo, LogicalValue, NdArray, Roi, RoiKind, Scalar, ValueKind,
};
use crate::wire::{decode_bytes, encode_bytes, float, tags, WireNode};
use crate::{Result, RpcError};
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Register every built-in kind, most specific first.
///
/// Spilled binaries precede inline ones so oversized payloads never inline.
pub fn register_builtins(registry: &mut TypeRegistry) {
    registry.register(tags::TYPED_NULL, Arc::new(TypedNullCodec));
    registry.register(tags::SCALAR, Arc::new(ScalarCodec));
    registry.register(tags::BINARY_SPILLED, Arc::new(SpilledBinaryCodec));
    registry.register(tags::BINARY_INLINE, Arc::new(InlineBinaryCodec));
    registry.register(tags::ARRAY, Arc::new(ArrayCodec));
    for kind in RoiKind::ALL {
        registry.register(kind.tag(), Arc::new(RoiCodec(kind)));
    }
    registry.register(tags::UUID, Arc::new(UuidCodec));
    registry.register(tags::EXCEPTION, Arc::new(ExceptionCodec));
    registry.register(tags::SEQUENCE, Arc::new(SequenceCodec));
    registry.register(tags::MAPPING, Arc::new(MappingCodec));
}

fn mismatch(tag: &str, value: &LogicalValue) -> RpcError {
    RpcError::encode(format!("{} codec cannot encode {:?}", tag, value.kind()))
}

// ============================================================================
// Typed null
// ============================================================================

struct TypedNullCodec;

impl TypeCodec for TypedNullCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::TypedNull(_))
    }

    fn encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> Result<WireNode> {
        match value {
            LogicalValue::TypedNull(kind) => {
                Ok(WireNode::new(tags::TYPED_NULL, json!({ "declared": kind.tag() })))
            }
            other => Err(mismatch(tags::TYPED_NULL, other)),
        }
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        node.payload.get("declared").map(Value::is_string).unwrap_or(false)
    }

    fn decode(&self, node: &WireNode, _cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let declared = node.str_field("declared")?;
        ValueKind::from_tag(declared)
            .map(LogicalValue::TypedNull)
            .ok_or_else(|| RpcError::decode(format!("unknown declared type '{}'", declared)))
    }
}

// ============================================================================
// Scalars
// ============================================================================

struct ScalarCodec;

impl TypeCodec for ScalarCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::Scalar(_))
    }

    fn encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> Result<WireNode> {
        let payload = match value {
            LogicalValue::Scalar(Scalar::None) => Value::Null,
            LogicalValue::Scalar(Scalar::Bool(b)) => json!(b),
            LogicalValue::Scalar(Scalar::Int(i)) => json!(i),
            LogicalValue::Scalar(Scalar::Float(f)) => float::to_json(*f),
            LogicalValue::Scalar(Scalar::Str(s)) => json!(s),
            other => return Err(mismatch(tags::SCALAR, other)),
        };
        Ok(WireNode::new(tags::SCALAR, payload))
    }

    fn decode(&self, node: &WireNode, _cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let scalar = match &node.payload {
            Value::Null => Scalar::None,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::String(s) => Scalar::Str(s.clone()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Scalar::Int(i)
                } else if n.is_f64() {
                    Scalar::Float(n.as_f64().unwrap_or_default())
                } else {
                    return Err(RpcError::decode(format!("integer {} out of range", n)));
                }
            }
            Value::Object(_) => match float::from_json(&node.payload) {
                Some(f) => Scalar::Float(f),
                None => return Err(RpcError::decode(format!("malformed scalar {}", node.payload))),
            },
            Value::Array(_) => {
                return Err(RpcError::decode(format!("malformed scalar {}", node.payload)))
            }
        };
        Ok(LogicalValue::Scalar(scalar))
    }
}

// ============================================================================
// Containers
// ============================================================================

struct SequenceCodec;

impl TypeCodec for SequenceCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::Sequence(_))
    }

    fn encode(&self, value: &LogicalValue, cx: &EncodeCx<'_>) -> Result<WireNode> {
        let LogicalValue::Sequence(items) = value else {
            return Err(mismatch(tags::SEQUENCE, value));
        };
        let children = items
            .iter()
            .map(|item| cx.flatten(item).map(WireNode::into_json))
            .collect::<Result<Vec<_>>>()?;
        Ok(WireNode::new(tags::SEQUENCE, Value::Array(children)))
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        node.payload.is_array()
    }

    fn decode(&self, node: &WireNode, cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let items = node
            .payload
            .as_array()
            .ok_or_else(|| RpcError::decode("sequence payload must be a list"))?;
        let values = items
            .iter()
            .map(|item| cx.unflatten(&WireNode::from_json(item)?))
            .collect::<Result<Vec<_>>>()?;
        Ok(LogicalValue::Sequence(values))
    }
}

struct MappingCodec;

impl TypeCodec for MappingCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::Mapping(_))
    }

    fn encode(&self, value: &LogicalValue, cx: &EncodeCx<'_>) -> Result<WireNode> {
        let LogicalValue::Mapping(map) = value else {
            return Err(mismatch(tags::MAPPING, value));
        };
        let mut children = Map::with_capacity(map.len());
        for (key, item) in map {
            children.insert(key.clone(), cx.flatten(item)?.into_json());
        }
        Ok(WireNode::new(tags::MAPPING, Value::Object(children)))
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        node.payload.is_object()
    }

    fn decode(&self, node: &WireNode, cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let object = node
            .payload
            .as_object()
            .ok_or_else(|| RpcError::decode("mapping payload must be an object"))?;
        let mut map = BTreeMap::new();
        for (key, item) in object {
            map.insert(key.clone(), cx.unflatten(&WireNode::from_json(item)?)?);
        }
        Ok(LogicalValue::Mapping(map))
    }
}

// ============================================================================
// Arrays
// ============================================================================

struct ArrayCodec;

impl TypeCodec for ArrayCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::Array(_))
    }

    fn encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> Result<WireNode> {
        let LogicalValue::Array(array) = value else {
            return Err(mismatch(tags::ARRAY, value));
        };
        Ok(WireNode::new(
            tags::ARRAY,
            json!({
                "shape": array.shape(),
                "dtype": array.dtype().as_str(),
                "data": encode_bytes(&array.data().to_le_bytes()),
            }),
        ))
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        node.payload.get("shape").map(Value::is_array).unwrap_or(false)
            && node.payload.get("dtype").map(Value::is_string).unwrap_or(false)
            && node.payload.get("data").map(Value::is_string).unwrap_or(false)
    }

    fn decode(&self, node: &WireNode, _cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let shape: Vec<usize> = serde_json::from_value(node.field("shape")?.clone())
            .map_err(|e| RpcError::decode(format!("invalid array shape: {}", e)))?;
        let dtype_tag = node.str_field("dtype")?;
        let dtype = DType::from_str(dtype_tag)
            .ok_or_else(|| RpcError::decode(format!("unknown dtype '{}'", dtype_tag)))?;
        let bytes = decode_bytes(node.str_field("data")?)?;
        let data = ArrayData::from_le_bytes(dtype, &bytes)?;
        let array = NdArray::new(shape, data).map_err(|e| RpcError::decode(e.to_string()))?;
        Ok(LogicalValue::Array(array))
    }
}

// ============================================================================
// Regions of interest
// ============================================================================

struct RoiCodec(RoiKind);

impl TypeCodec for RoiCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::Roi(roi) if roi.kind() == self.0)
    }

    fn encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> Result<WireNode> {
        let payload = match value {
            LogicalValue::Roi(Roi::Linear(roi)) => serde_json::to_value(roi)?,
            LogicalValue::Roi(Roi::Rect(roi)) => serde_json::to_value(roi)?,
            LogicalValue::Roi(Roi::Sector(roi)) => serde_json::to_value(roi)?,
            LogicalValue::Roi(Roi::Point(roi)) => serde_json::to_value(roi)?,
            LogicalValue::Roi(Roi::Circle(roi)) => serde_json::to_value(roi)?,
            other => return Err(mismatch(self.0.tag(), other)),
        };
        Ok(WireNode::new(self.0.tag(), payload))
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        node.payload.is_object()
    }

    fn decode(&self, node: &WireNode, _cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let payload = node.payload.clone();
        let invalid = |e: serde_json::Error| RpcError::decode(format!("invalid {}: {}", node.tag, e));
        let roi = match self.0 {
            RoiKind::Linear => Roi::Linear(serde_json::from_value(payload).map_err(invalid)?),
            RoiKind::Rect => Roi::Rect(serde_json::from_value(payload).map_err(invalid)?),
            RoiKind::Sector => Roi::Sector(serde_json::from_value(payload).map_err(invalid)?),
            RoiKind::Point => Roi::Point(serde_json::from_value(payload).map_err(invalid)?),
            RoiKind::Circle => Roi::Circle(serde_json::from_value(payload).map_err(invalid)?),
        };
        Ok(LogicalValue::Roi(roi))
    }
}

// ============================================================================
// Binary payloads
// ============================================================================

struct SpilledBinaryCodec;

impl TypeCodec for SpilledBinaryCodec {
    fn can_encode(&self, value: &LogicalValue, cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::Binary(bytes) if cx.spill_config().should_spill(bytes.len()))
    }

    fn encode(&self, value: &LogicalValue, cx: &EncodeCx<'_>) -> Result<WireNode> {
        let LogicalValue::Binary(bytes) = value else {
            return Err(mismatch(tags::BINARY_SPILLED, value));
        };
        let path = cx.spill(bytes).map_err(|e| RpcError::encode(e.to_string()))?;
        Ok(WireNode::new(
            tags::BINARY_SPILLED,
            json!({
                "path": path.to_string_lossy(),
                "length": bytes.len(),
            }),
        ))
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        node.payload.get("path").map(Value::is_string).unwrap_or(false)
            && node.payload.get("length").map(Value::is_u64).unwrap_or(false)
    }

    fn decode(&self, node: &WireNode, cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let path = PathBuf::from(node.str_field("path")?);
        let length = node.u64_field("length")?;
        let bytes = cx.spill_config().rehydrate(&path, length)?;
        Ok(LogicalValue::Binary(Bytes::from(bytes)))
    }
}

struct InlineBinaryCodec;

impl TypeCodec for InlineBinaryCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::Binary(_))
    }

    fn encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> Result<WireNode> {
        let LogicalValue::Binary(bytes) = value else {
            return Err(mismatch(tags::BINARY_INLINE, value));
        };
        Ok(WireNode::new(
            tags::BINARY_INLINE,
            json!({ "data": encode_bytes(bytes) }),
        ))
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        node.payload.get("data").map(Value::is_string).unwrap_or(false)
    }

    fn decode(&self, node: &WireNode, _cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let bytes = decode_bytes(node.str_field("data")?)?;
        Ok(LogicalValue::Binary(Bytes::from(bytes)))
    }
}

// ============================================================================
// Identifiers and exceptions
// ============================================================================

struct UuidCodec;

impl TypeCodec for UuidCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::Uuid(_))
    }

    fn encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> Result<WireNode> {
        let LogicalValue::Uuid(id) = value else {
            return Err(mismatch(tags::UUID, value));
        };
        Ok(WireNode::new(tags::UUID, json!(id.hyphenated().to_string())))
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        node.payload.is_string()
    }

    fn decode(&self, node: &WireNode, _cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let text = node.payload.as_str().unwrap_or_default();
        uuid::Uuid::parse_str(text)
            .map(LogicalValue::Uuid)
            .map_err(|e| RpcError::decode(format!("invalid uuid '{}': {}", text, e)))
    }
}

struct ExceptionCodec;

impl TypeCodec for ExceptionCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        matches!(value, LogicalValue::Exception(_))
    }

    fn encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> Result<WireNode> {
        let LogicalValue::Exception(info) = value else {
            return Err(mismatch(tags::EXCEPTION, value));
        };
        Ok(WireNode::new(tags::EXCEPTION, serde_json::to_value(info)?))
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        node.payload.get("kind").map(Value::is_string).unwrap_or(false)
            && node.payload.get("message").map(Value::is_string).unwrap_or(false)
    }

    fn decode(&self, node: &WireNode, _cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        let info: ExceptionInfo = serde_json::from_value(node.payload.clone())
            .map_err(|e| RpcError::decode(format!("invalid exception: {}", e)))?;
        Ok(LogicalValue::Exception(info))
    }
}
