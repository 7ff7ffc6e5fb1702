//! Flattening: logical values to wire nodes and back.
//!
//! [`Flattener`] walks a value depth-first and asks the [`TypeRegistry`] for
//! the first codec that accepts each node. [`Unflattener`] reverses this by
//! tag. Both carry the spill configuration explicitly; codecs reach it and
//! recurse into children through the [`EncodeCx`]/[`DecodeCx`] they are given.
//!
//! For every value `v` that flattens, `unflatten(flatten(v)) == v`.
//!
//! A flatten that fails part-way removes the spill files it already wrote.

use crate::config::RpcConfig;
use crate::registry::TypeRegistry;
use crate::spill::SpillConfig;
use crate::value::LogicalValue;
use crate::wire::WireNode;
use crate::{Result, RpcError};
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;

/// Encoding context handed to codecs.
pub struct EncodeCx<'a> {
    flattener: &'a Flattener,
    depth: usize,
    spilled: &'a RefCell<Vec<PathBuf>>,
}

impl EncodeCx<'_> {
    /// Flatten a child value one level deeper.
    pub fn flatten(&self, value: &LogicalValue) -> Result<WireNode> {
        self.flattener.flatten_at(value, self.depth + 1, self.spilled)
    }

    pub fn spill_config(&self) -> &SpillConfig {
        &self.flattener.spill
    }

    /// Spill `bytes` and remember the file, so it is removed again if the
    /// enclosing flatten fails.
    pub fn spill(&self, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.flattener.spill.spill(bytes)?;
        self.spilled.borrow_mut().push(path.clone());
        Ok(path)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Decoding context handed to codecs.
pub struct DecodeCx<'a> {
    unflattener: &'a Unflattener,
    depth: usize,
}

impl DecodeCx<'_> {
    /// Unflatten a child node one level deeper.
    pub fn unflatten(&self, node: &WireNode) -> Result<LogicalValue> {
        self.unflattener.unflatten_at(node, self.depth + 1)
    }

    pub fn spill_config(&self) -> &SpillConfig {
        &self.unflattener.spill
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Turns logical values into wire nodes.
#[derive(Debug, Clone)]
pub struct Flattener {
    registry: Arc<TypeRegistry>,
    spill: Arc<SpillConfig>,
}

impl Flattener {
    pub fn new(registry: Arc<TypeRegistry>, spill: Arc<SpillConfig>) -> Self {
        Self { registry, spill }
    }

    pub fn flatten(&self, value: &LogicalValue) -> Result<WireNode> {
        let spilled = RefCell::new(Vec::new());
        let result = self.flatten_at(value, 0, &spilled);
        self.discard_on_error(result, spilled)
    }

    /// Flatten an ordered argument list.
    ///
    /// Either every value flattens or none of the spill files survive.
    pub fn flatten_all(&self, values: &[LogicalValue]) -> Result<Vec<WireNode>> {
        let spilled = RefCell::new(Vec::new());
        let result: Result<Vec<WireNode>> = values
            .iter()
            .map(|value| self.flatten_at(value, 0, &spilled))
            .collect();
        self.discard_on_error(result, spilled)
    }

    /// Whether some registered codec accepts `value` at the top level.
    pub fn can_flatten(&self, value: &LogicalValue) -> bool {
        let spilled = RefCell::new(Vec::new());
        let cx = EncodeCx {
            flattener: self,
            depth: 0,
            spilled: &spilled,
        };
        self.registry.encoder_for(value, &cx).is_some()
    }

    pub fn spill_config(&self) -> &Arc<SpillConfig> {
        &self.spill
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    fn discard_on_error<T>(&self, result: Result<T>, spilled: RefCell<Vec<PathBuf>>) -> Result<T> {
        if result.is_err() {
            for path in spilled.into_inner() {
                self.spill.discard(&path);
            }
        }
        result
    }

    fn flatten_at(
        &self,
        value: &LogicalValue,
        depth: usize,
        spilled: &RefCell<Vec<PathBuf>>,
    ) -> Result<WireNode> {
        if depth > RpcConfig::MAX_NESTING_DEPTH {
            return Err(RpcError::encode(format!(
                "value nests deeper than {} levels",
                RpcConfig::MAX_NESTING_DEPTH
            )));
        }

        let cx = EncodeCx {
            flattener: self,
            depth,
            spilled,
        };
        let (kind, codec) = self.registry.encoder_for(value, &cx).ok_or_else(|| {
            RpcError::encode(format!(
                "no registered encoder accepts value of kind {}",
                value
                    .kind()
                    .map(|k| k.tag())
                    .unwrap_or_else(|| "none".to_string())
            ))
        })?;

        codec.encode(value, &cx).map_err(|e| match e {
            RpcError::Encode { .. } => e,
            other => RpcError::encode(format!("{} encoder failed: {}", kind, other)),
        })
    }
}

/// Rebuilds logical values from wire nodes.
#[derive(Debug, Clone)]
pub struct Unflattener {
    registry: Arc<TypeRegistry>,
    spill: Arc<SpillConfig>,
}

impl Unflattener {
    pub fn new(registry: Arc<TypeRegistry>, spill: Arc<SpillConfig>) -> Self {
        Self { registry, spill }
    }

    pub fn unflatten(&self, node: &WireNode) -> Result<LogicalValue> {
        self.unflatten_at(node, 0)
    }

    pub fn spill_config(&self) -> &Arc<SpillConfig> {
        &self.spill
    }

    /// Unflatten an ordered argument list.
    pub fn unflatten_all(&self, nodes: &[WireNode]) -> Result<Vec<LogicalValue>> {
        nodes.iter().map(|node| self.unflatten(node)).collect()
    }

    /// Whether a decoder is registered for the node's tag and accepts its shape.
    pub fn can_unflatten(&self, node: &WireNode) -> bool {
        self.registry
            .decoder_for(&node.tag)
            .map(|codec| codec.can_decode(node))
            .unwrap_or(false)
    }

    fn unflatten_at(&self, node: &WireNode, depth: usize) -> Result<LogicalValue> {
        if depth > RpcConfig::MAX_NESTING_DEPTH {
            return Err(RpcError::decode(format!(
                "wire node nests deeper than {} levels",
                RpcConfig::MAX_NESTING_DEPTH
            )));
        }

        let codec = self
            .registry
            .decoder_for(&node.tag)
            .ok_or_else(|| RpcError::decode(format!("no decoder registered for type '{}'", node.tag)))?;

        if !codec.can_decode(node) {
            return Err(RpcError::decode(format!(
                "malformed {} node: {}",
                node.tag, node.payload
            )));
        }

        let cx = DecodeCx {
            unflattener: self,
            depth,
        };
        codec.decode(node, &cx).map_err(|e| match e {
            RpcError::Decode { .. } => e,
            other => RpcError::decode(format!("{} decoder failed: {}", node.tag, other)),
        })
    }
}

/// Flattener and unflattener sharing one registry and spill location.
pub fn codec_pair(registry: Arc<TypeRegistry>, spill: Arc<SpillConfig>) -> (Flattener, Unflattener) {
    (
        Flattener::new(registry.clone(), spill.clone()),
        Unflattener::new(registry, spill),
    )
}
