//! Analysis RPC - request/response calls between analysis processes.
//!
//! A client invokes named operations on a server over TCP. Arguments and
//! results are [`LogicalValue`]s (scalars, sequences, mappings, numeric
//! arrays, region-of-interest descriptors, typed nulls, binaries,
//! exceptions), flattened into a JSON wire tree by a [`TypeRegistry`] of
//! codecs. Binaries above the inline threshold travel as spill files in a
//! directory both processes can see.
//!
//! # Example
//!
//! ```rust,ignore
//! use analysis_rpc::{HandlerResult, LogicalValue, RpcClient, RpcServer};
//!
//! #[tokio::main]
//! async fn main() -> analysis_rpc::Result<()> {
//!     let mut server = RpcServer::new()?;
//!     server.bind("127.0.0.1", 0).await?;
//!     server.add_handler("cat", |args: Vec<LogicalValue>| -> HandlerResult {
//!         let joined: String = args.iter().filter_map(|a| a.as_str()).collect();
//!         Ok(LogicalValue::from(joined))
//!     })?;
//!     let handle = server.start()?;
//!
//!     let client = RpcClient::connect(handle.addr()).await?;
//!     let result = client
//!         .call("cat", vec!["Hello, ".into(), "World!".into()])
//!         .await?;
//!     assert_eq!(result.as_str(), Some("Hello, World!"));
//!
//!     handle.stop().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod flatten;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod spill;
pub mod value;
pub mod wire;

// Re-export commonly used types
pub use client::RpcClient;
pub use config::RpcConfig;
pub use error::{Result, RpcError};
pub use flatten::{codec_pair, DecodeCx, EncodeCx, Flattener, Unflattener};
pub use handler::{with_arity, Handler, HandlerError, HandlerResult, HandlerTable};
pub use protocol::{RpcReply, RpcRequest, RpcResponse};
pub use registry::{TypeCodec, TypeRegistry};
pub use server::{RpcServer, RpcServerHandle, ServerState, ShutdownHandle};
pub use spill::{init_spill_config, spill_config, SpillConfig};
pub use value::{
    ArrayData, CircleRoi, DType, ExceptionInfo, LinearRoi, LogicalValue, NdArray, PointRoi,
    RectRoi, Roi, RoiKind, Scalar, SectorRoi, SectorSymmetry, ValueKind,
};
pub use wire::WireNode;
