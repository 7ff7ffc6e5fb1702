//! Type registry: which codec flattens a value, and which one rebuilds a node.
//!
//! The two lookups differ:
//!
//! - **Encoding** walks an ordered list and picks the first codec whose
//!   `can_encode` accepts the value. Ambiguous kinds must therefore be
//!   registered most-specific first.
//! - **Decoding** is keyed by the node's `type` tag, so it does not depend
//!   on registration order. An unknown tag is an error, never skipped.

mod builtin;

pub use builtin::register_builtins;

use crate::flatten::{DecodeCx, EncodeCx};
use crate::value::LogicalValue;
use crate::wire::WireNode;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Encoder/decoder pair for one wire tag.
pub trait TypeCodec: Send + Sync {
    /// Whether this codec wants to flatten `value`.
    fn can_encode(&self, value: &LogicalValue, cx: &EncodeCx<'_>) -> bool;

    fn encode(&self, value: &LogicalValue, cx: &EncodeCx<'_>) -> Result<WireNode>;

    /// Structural check of a node already matched by tag.
    fn can_decode(&self, _node: &WireNode) -> bool {
        true
    }

    fn decode(&self, node: &WireNode, cx: &DecodeCx<'_>) -> Result<LogicalValue>;
}

type CanEncodeFn = dyn Fn(&LogicalValue) -> bool + Send + Sync;
type EncodeFn = dyn Fn(&LogicalValue, &EncodeCx<'_>) -> Result<WireNode> + Send + Sync;
type CanDecodeFn = dyn Fn(&WireNode) -> bool + Send + Sync;
type DecodeFn = dyn Fn(&WireNode, &DecodeCx<'_>) -> Result<LogicalValue> + Send + Sync;

/// A codec assembled from closures, for [`TypeRegistry::register_fn`].
pub struct FnCodec {
    can_encode: Box<CanEncodeFn>,
    encode: Box<EncodeFn>,
    can_decode: Box<CanDecodeFn>,
    decode: Box<DecodeFn>,
}

impl TypeCodec for FnCodec {
    fn can_encode(&self, value: &LogicalValue, _cx: &EncodeCx<'_>) -> bool {
        (self.can_encode)(value)
    }

    fn encode(&self, value: &LogicalValue, cx: &EncodeCx<'_>) -> Result<WireNode> {
        (self.encode)(value, cx)
    }

    fn can_decode(&self, node: &WireNode) -> bool {
        (self.can_decode)(node)
    }

    fn decode(&self, node: &WireNode, cx: &DecodeCx<'_>) -> Result<LogicalValue> {
        (self.decode)(node, cx)
    }
}

/// Registered codecs, in encoding priority order.
#[derive(Default)]
pub struct TypeRegistry {
    encoders: Vec<(String, Arc<dyn TypeCodec>)>,
    decoders: HashMap<String, Arc<dyn TypeCodec>>,
}

impl TypeRegistry {
    /// An empty registry. Register custom kinds here before calling
    /// [`register_builtins`] if they must take priority over built-ins.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    /// Register a codec for `kind`.
    ///
    /// A new kind is appended to the encoding order. Registering an existing
    /// kind replaces its codec in place for both encoding and decoding.
    pub fn register(&mut self, kind: impl Into<String>, codec: Arc<dyn TypeCodec>) {
        let kind = kind.into();
        match self.encoders.iter_mut().find(|(k, _)| *k == kind) {
            Some(slot) => {
                debug!("Replacing codec for kind '{}'", kind);
                slot.1 = codec.clone();
            }
            None => self.encoders.push((kind.clone(), codec.clone())),
        }
        self.decoders.insert(kind, codec);
    }

    /// Replace only the decoder for `kind`, leaving encoding untouched.
    pub fn register_decoder(&mut self, kind: impl Into<String>, codec: Arc<dyn TypeCodec>) {
        self.decoders.insert(kind.into(), codec);
    }

    /// Register a codec built from closures.
    pub fn register_fn<CE, E, CD, D>(
        &mut self,
        kind: impl Into<String>,
        can_encode: CE,
        encode: E,
        can_decode: CD,
        decode: D,
    ) where
        CE: Fn(&LogicalValue) -> bool + Send + Sync + 'static,
        E: Fn(&LogicalValue, &EncodeCx<'_>) -> Result<WireNode> + Send + Sync + 'static,
        CD: Fn(&WireNode) -> bool + Send + Sync + 'static,
        D: Fn(&WireNode, &DecodeCx<'_>) -> Result<LogicalValue> + Send + Sync + 'static,
    {
        self.register(
            kind,
            Arc::new(FnCodec {
                can_encode: Box::new(can_encode),
                encode: Box::new(encode),
                can_decode: Box::new(can_decode),
                decode: Box::new(decode),
            }),
        );
    }

    /// First codec, in registration order, that accepts `value`.
    pub fn encoder_for(&self, value: &LogicalValue, cx: &EncodeCx<'_>) -> Option<(&str, &dyn TypeCodec)> {
        self.encoders
            .iter()
            .find(|(_, codec)| codec.can_encode(value, cx))
            .map(|(kind, codec)| (kind.as_str(), codec.as_ref()))
    }

    /// Codec registered for exactly this tag.
    pub fn decoder_for(&self, tag: &str) -> Option<&dyn TypeCodec> {
        self.decoders.get(tag).map(|codec| codec.as_ref())
    }

    /// Registered kinds in encoding order.
    pub fn kinds(&self) -> Vec<&str> {
        self.encoders.iter().map(|(kind, _)| kind.as_str()).collect()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
