//! Error types for the analysis RPC layer.
//!
//! The variants follow the fault taxonomy of the protocol: configuration and
//! lifecycle errors raised locally, marshalling errors raised by the
//! flattener, and classified faults re-raised on the client from a server
//! response. Transport failures are kept apart from protocol faults.

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for the analysis RPC library.
#[derive(Debug, Error)]
pub enum RpcError {
    // Server lifecycle errors
    #[error("Failed to bind {addr}: {message}")]
    Bind {
        addr: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Handler already registered: {name}")]
    DuplicateHandler { name: String },

    #[error("Cannot {operation} while server is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    // Marshalling errors
    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Classified faults reported by a server
    #[error("{message}")]
    NoSuchHandler { message: String },

    #[error("Argument decode fault: {message}")]
    ArgumentDecode { message: String },

    #[error("Result encode fault: {message}")]
    ResultEncode { message: String },

    #[error("{kind}: {message}")]
    Handler { kind: String, message: String },

    // Transport errors
    #[error("Transport error talking to {addr}: {message}")]
    Transport { addr: SocketAddr, message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RpcError {
    pub fn encode(message: impl Into<String>) -> Self {
        RpcError::Encode {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        RpcError::Decode {
            message: message.into(),
        }
    }

    /// True for failures of the connection itself rather than of the call.
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport { .. })
    }

    /// True for classified faults returned by a server in a well-formed response.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            RpcError::NoSuchHandler { .. }
                | RpcError::ArgumentDecode { .. }
                | RpcError::ResultEncode { .. }
                | RpcError::Handler { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RpcError::Handler {
            kind: "TypeError".into(),
            message: "bad arg".into(),
        };
        assert_eq!(err.to_string(), "TypeError: bad arg");

        let err = RpcError::NoSuchHandler {
            message: "No handler registered for cat_invalid".into(),
        };
        assert_eq!(err.to_string(), "No handler registered for cat_invalid");
    }

    #[test]
    fn test_classification() {
        let transport = RpcError::Transport {
            addr: "127.0.0.1:1".parse().unwrap(),
            message: "connection refused".into(),
        };
        assert!(transport.is_transport());
        assert!(!transport.is_fault());

        let fault = RpcError::ArgumentDecode {
            message: "unknown tag".into(),
        };
        assert!(fault.is_fault());
        assert!(!fault.is_transport());
    }
}
