//! Centralized configuration for the analysis RPC layer.
//!
//! Limits and defaults are constants; the spill location and inlining
//! threshold can be overridden from the environment (see [`crate::spill`]).

use std::time::Duration;

/// Transport and marshalling limits.
pub struct RpcConfig;

impl RpcConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";

    // Framing
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024; // 64MB

    // Connections
    pub const MAX_CONNECTIONS: usize = 256;
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const ALIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

    // Flattening
    pub const DEFAULT_INLINE_THRESHOLD: usize = 64 * 1024; // 64KB
    pub const MAX_NESTING_DEPTH: usize = 128;

    // Environment
    pub const SPILL_DIR_ENV: &'static str = "ANALYSIS_RPC_SPILL_DIR";
    pub const INLINE_THRESHOLD_ENV: &'static str = "ANALYSIS_RPC_INLINE_THRESHOLD";
    pub const SPILL_FILE_PREFIX: &'static str = "spill-";
    pub const SPILL_FILE_EXTENSION: &'static str = "bin";
}
