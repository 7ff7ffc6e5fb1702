//! Self-describing wire representation of flattened values.
//!
//! Every flattened value is a [`WireNode`]: a `type` tag naming the codec
//! that produced it, and a JSON payload whose layout that codec owns.
//! Container payloads embed child nodes as JSON objects of the same shape.
//!
//! ```text
//! {"type": "sequence", "payload": [{"type": "scalar", "payload": 1}, ...]}
//! ```

use crate::{Result, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Wire tags of the built-in kinds.
pub mod tags {
    pub const SCALAR: &str = "scalar";
    pub const SEQUENCE: &str = "sequence";
    pub const MAPPING: &str = "mapping";
    pub const ARRAY: &str = "array";
    pub const ROI_LINEAR: &str = "roi_linear";
    pub const ROI_RECT: &str = "roi_rect";
    pub const ROI_SECTOR: &str = "roi_sector";
    pub const ROI_POINT: &str = "roi_point";
    pub const ROI_CIRCLE: &str = "roi_circle";
    pub const TYPED_NULL: &str = "typed_null";
    pub const BINARY_INLINE: &str = "binary_inline";
    pub const BINARY_SPILLED: &str = "binary_spilled";
    pub const UUID: &str = "uuid";
    pub const EXCEPTION: &str = "exception";
}

/// Flattened form of a logical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireNode {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub payload: Value,
}

impl WireNode {
    pub fn new(tag: impl Into<String>, payload: Value) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    /// Embed this node as a JSON value inside a parent payload.
    pub fn into_json(self) -> Value {
        let mut object = serde_json::Map::with_capacity(2);
        object.insert("type".to_string(), Value::String(self.tag));
        object.insert("payload".to_string(), self.payload);
        Value::Object(object)
    }

    /// Parse a child node embedded in a parent payload.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| RpcError::decode(format!("expected wire node object, got {}", value)))?;
        let tag = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::decode("wire node is missing its type tag"))?;
        let payload = object.get("payload").cloned().unwrap_or(Value::Null);
        Ok(Self::new(tag, payload))
    }

    /// Required payload field.
    pub fn field(&self, name: &str) -> Result<&Value> {
        self.payload.get(name).ok_or_else(|| {
            RpcError::decode(format!("{} node is missing field '{}'", self.tag, name))
        })
    }

    pub fn str_field(&self, name: &str) -> Result<&str> {
        self.field(name)?.as_str().ok_or_else(|| {
            RpcError::decode(format!("{} field '{}' must be a string", self.tag, name))
        })
    }

    pub fn u64_field(&self, name: &str) -> Result<u64> {
        self.field(name)?.as_u64().ok_or_else(|| {
            RpcError::decode(format!(
                "{} field '{}' must be an unsigned integer",
                self.tag, name
            ))
        })
    }
}

/// Hex-encode a byte buffer for a JSON payload.
pub fn encode_bytes(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex byte buffer from a JSON payload.
pub fn decode_bytes(text: &str) -> Result<Vec<u8>> {
    hex::decode(text).map_err(|e| RpcError::decode(format!("invalid byte buffer: {}", e)))
}

/// Paths of every spilled binary referenced from `node`, at any depth.
pub fn spilled_paths(node: &WireNode) -> Vec<PathBuf> {
    fn walk(value: &Value, out: &mut Vec<PathBuf>) {
        match value {
            Value::Object(object) => {
                let spilled = object.get("type").and_then(Value::as_str) == Some(tags::BINARY_SPILLED);
                if spilled {
                    if let Some(path) = object.get("payload").and_then(|p| p.get("path")).and_then(Value::as_str) {
                        out.push(PathBuf::from(path));
                    }
                    return;
                }
                object.values().for_each(|v| walk(v, out));
            }
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    if node.tag == tags::BINARY_SPILLED {
        if let Ok(path) = node.str_field("path") {
            out.push(PathBuf::from(path));
        }
    } else {
        walk(&node.payload, &mut out);
    }
    out
}

/// Float encoding shared by scalars and ROI geometry.
///
/// Finite values are plain JSON numbers. NaN and the infinities have no JSON
/// number form and travel as `{"float": "nan" | "inf" | "-inf"}`.
pub mod float {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::{json, Value};

    pub fn to_json(f: f64) -> Value {
        if f.is_finite() {
            json!(f)
        } else if f.is_nan() {
            json!({ "float": "nan" })
        } else if f > 0.0 {
            json!({ "float": "inf" })
        } else {
            json!({ "float": "-inf" })
        }
    }

    /// Inverse of [`to_json`]. Integers widen to `f64`.
    pub fn from_json(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::Object(object) => match object.get("float").and_then(Value::as_str) {
                Some("nan") => Some(f64::NAN),
                Some("inf") => Some(f64::INFINITY),
                Some("-inf") => Some(f64::NEG_INFINITY),
                _ => None,
            },
            _ => None,
        }
    }

    fn expect_float<E: serde::de::Error>(value: &Value) -> Result<f64, E> {
        from_json(value).ok_or_else(|| E::custom(format!("expected a float, got {}", value)))
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        to_json(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        expect_float(&value)
    }

    /// Same encoding for `[f64; 2]` coordinate pairs.
    pub mod pair {
        use super::{expect_float, to_json};
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use serde_json::Value;

        pub fn serialize<S: Serializer>(value: &[f64; 2], serializer: S) -> Result<S::Ok, S::Error> {
            [to_json(value[0]), to_json(value[1])].serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 2], D::Error> {
            let [a, b] = <[Value; 2]>::deserialize(deserializer)?;
            Ok([expect_float(&a)?, expect_float(&b)?])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_node_uses_type_key() {
        let node = WireNode::new(tags::SCALAR, json!("hi"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json, json!({"type": "scalar", "payload": "hi"}));
        assert_eq!(node.clone().into_json(), json);
    }

    #[test]
    fn test_from_json_requires_tag() {
        assert!(WireNode::from_json(&json!({"payload": 1})).is_err());
        assert!(WireNode::from_json(&json!([1, 2])).is_err());

        let node = WireNode::from_json(&json!({"type": "typed_null"})).unwrap();
        assert_eq!(node.tag, "typed_null");
        assert_eq!(node.payload, Value::Null);
    }

    #[test]
    fn test_field_accessors_report_missing_fields() {
        let node = WireNode::new(tags::BINARY_SPILLED, json!({"path": "/tmp/x", "length": 3}));
        assert_eq!(node.str_field("path").unwrap(), "/tmp/x");
        assert_eq!(node.u64_field("length").unwrap(), 3);

        let err = node.str_field("missing").unwrap_err();
        assert!(err.to_string().contains("missing field 'missing'"));
        assert!(node.u64_field("path").is_err());
    }

    #[test]
    fn test_spilled_paths_finds_nested_references() {
        let spilled = |path: &str| json!({"type": "binary_spilled", "payload": {"path": path, "length": 1}});
        let node = WireNode::new(
            tags::MAPPING,
            json!({
                "a": spilled("/tmp/one"),
                "b": {"type": "sequence", "payload": [{"type": "scalar", "payload": 1}, spilled("/tmp/two")]},
            }),
        );
        let mut paths = spilled_paths(&node);
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("/tmp/one"), PathBuf::from("/tmp/two")]);

        let top = WireNode::from_json(&spilled("/tmp/top")).unwrap();
        assert_eq!(spilled_paths(&top), vec![PathBuf::from("/tmp/top")]);
        assert!(spilled_paths(&WireNode::new(tags::SCALAR, json!("path"))).is_empty());
    }

    #[test]
    fn test_non_finite_floats_have_a_json_form() {
        assert_eq!(float::to_json(1.5), json!(1.5));
        assert_eq!(float::to_json(f64::NEG_INFINITY), json!({"float": "-inf"}));
        assert!(float::from_json(&float::to_json(f64::NAN)).unwrap().is_nan());
        assert_eq!(float::from_json(&json!(3)), Some(3.0));
        assert_eq!(float::from_json(&json!(null)), None);
        assert_eq!(float::from_json(&json!({"float": "tiny"})), None);
    }

    #[test]
    fn test_byte_buffer_encoding() {
        let text = encode_bytes(&[0x00, 0xff, 0x10]);
        assert_eq!(text, "00ff10");
        assert_eq!(decode_bytes(&text).unwrap(), vec![0x00, 0xff, 0x10]);
        assert!(decode_bytes("zz").is_err());
    }
}
