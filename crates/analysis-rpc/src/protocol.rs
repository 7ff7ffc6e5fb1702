//! Request/response envelopes and framing.
//!
//! Each message is a 4-byte big-endian length prefix followed by a UTF-8
//! JSON envelope. A connection carries one request at a time; the server
//! answers every request with exactly one response, echoing the request id.
//! Id 0 marks a reply to a request that could not be parsed.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```

use crate::config::RpcConfig;
use crate::wire::WireNode;
use crate::{Result, RpcError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Prefix of the `no_handler` message; clients match on the full string.
pub const NO_HANDLER_PREFIX: &str = "No handler registered for ";

/// A call: operation name plus flattened arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: u64,
    pub operation: String,
    #[serde(default)]
    pub arguments: Vec<WireNode>,
}

impl RpcRequest {
    pub fn new(operation: impl Into<String>, arguments: Vec<WireNode>) -> Self {
        Self {
            id: 0,
            operation: operation.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

/// A response tagged with the id of the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    #[serde(default)]
    pub id: u64,
    #[serde(flatten)]
    pub response: RpcResponse,
}

impl RpcReply {
    pub fn new(id: u64, response: RpcResponse) -> Self {
        Self { id, response }
    }
}

/// Exactly one of a successful result or a classified fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RpcResponse {
    Ok { result: WireNode },
    NoHandler { message: String },
    ArgumentDecodeError { message: String },
    HandlerError { kind: String, message: String },
    ResultEncodeError { message: String },
}

impl RpcResponse {
    pub fn no_handler(operation: &str) -> Self {
        RpcResponse::NoHandler {
            message: format!("{}{}", NO_HANDLER_PREFIX, operation),
        }
    }

    /// Status string as it appears on the wire.
    pub fn status(&self) -> &'static str {
        match self {
            RpcResponse::Ok { .. } => "ok",
            RpcResponse::NoHandler { .. } => "no_handler",
            RpcResponse::ArgumentDecodeError { .. } => "argument_decode_error",
            RpcResponse::HandlerError { .. } => "handler_error",
            RpcResponse::ResultEncodeError { .. } => "result_encode_error",
        }
    }

    /// Split into the result node or the matching local error.
    pub fn into_result(self) -> Result<WireNode> {
        match self {
            RpcResponse::Ok { result } => Ok(result),
            RpcResponse::NoHandler { message } => Err(RpcError::NoSuchHandler { message }),
            RpcResponse::ArgumentDecodeError { message } => {
                Err(RpcError::ArgumentDecode { message })
            }
            RpcResponse::HandlerError { kind, message } => Err(RpcError::Handler { kind, message }),
            RpcResponse::ResultEncodeError { message } => Err(RpcError::ResultEncode { message }),
        }
    }
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > RpcConfig::MAX_MESSAGE_SIZE {
        return Err(RpcError::Protocol {
            message: format!(
                "message size {} exceeds maximum {}",
                len,
                RpcConfig::MAX_MESSAGE_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > RpcConfig::MAX_MESSAGE_SIZE {
        return Err(RpcError::Protocol {
            message: format!(
                "message size {} exceeds maximum {}",
                payload.len(),
                RpcConfig::MAX_MESSAGE_SIZE
            ),
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::tags;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = RpcRequest::new("cat", vec![WireNode::new(tags::SCALAR, json!("a"))]).with_id(7);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            json!({
                "id": 7,
                "operation": "cat",
                "arguments": [{"type": "scalar", "payload": "a"}]
            })
        );

        // Id and arguments may be omitted.
        let bare: RpcRequest = serde_json::from_value(json!({"operation": "ping"})).unwrap();
        assert_eq!(bare, RpcRequest::new("ping", vec![]));
    }

    #[test]
    fn test_reply_carries_id_beside_status() {
        let reply = RpcReply::new(
            3,
            RpcResponse::Ok {
                result: WireNode::new(tags::SCALAR, json!("ab")),
            },
        );
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            json,
            json!({"id": 3, "status": "ok", "result": {"type": "scalar", "payload": "ab"}})
        );
        assert_eq!(serde_json::from_value::<RpcReply>(json).unwrap(), reply);

        let fault: RpcReply =
            serde_json::from_value(json!({"status": "no_handler", "message": "m"})).unwrap();
        assert_eq!(fault.id, 0);
        assert_eq!(fault.response.status(), "no_handler");
    }

    #[test]
    fn test_response_status_tags() {
        let ok = RpcResponse::Ok {
            result: WireNode::new(tags::SCALAR, json!(1)),
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["result"]["type"], "scalar");
        assert_eq!(ok.status(), "ok");

        let fault = RpcResponse::HandlerError {
            kind: "TypeError".into(),
            message: "bad arg".into(),
        };
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(
            json,
            json!({"status": "handler_error", "kind": "TypeError", "message": "bad arg"})
        );

        for response in [
            RpcResponse::no_handler("x"),
            RpcResponse::ArgumentDecodeError { message: "m".into() },
            RpcResponse::ResultEncodeError { message: "m".into() },
        ] {
            let json = serde_json::to_value(&response).unwrap();
            assert_eq!(json["status"], response.status());
        }
    }

    #[test]
    fn test_no_handler_message_is_exact() {
        match RpcResponse::no_handler("cat_invalid").into_result() {
            Err(RpcError::NoSuchHandler { message }) => {
                assert_eq!(message, "No handler registered for cat_invalid")
            }
            other => panic!("Expected NoSuchHandler, got: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_status_fails_to_parse() {
        let result = serde_json::from_value::<RpcResponse>(json!({"status": "maybe"}));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_frame_read_write_roundtrip() {
        let payload = b"hello world";
        let mut buf = Vec::new();

        write_frame(&mut buf, payload).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let read_back = read_frame(&mut cursor).await.unwrap();

        assert_eq!(read_back, Some(payload.to_vec()));
    }

    #[tokio::test]
    async fn test_frame_read_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result = read_frame(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_frame_read_oversized_returns_error() {
        let huge_len: u32 = (RpcConfig::MAX_MESSAGE_SIZE + 1) as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        let mut cursor = std::io::Cursor::new(buf);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(RpcError::Protocol { .. })));
    }
}
