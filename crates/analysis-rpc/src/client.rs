//! TCP RPC client.
//!
//! Flattens call arguments, sends one request, and unflattens the result.
//! Server faults come back as the matching [`RpcError`] variant; transport
//! failures are reported as [`RpcError::Transport`] and never retried.
//!
//! Every request carries an id that the server echoes. A call abandoned while
//! waiting for its reply (for example under `tokio::time::timeout`) leaves
//! that reply on the stream; the next call skips it. A call abandoned while
//! its request was still being written leaves the stream unusable, and later
//! calls fail with a transport error.
//!
//! # Thread Safety
//!
//! The client uses a tokio `Mutex` to serialize access to the TCP stream,
//! so one client can be shared between tasks; calls over it run one at a
//! time. Use separate clients for concurrent calls.

use crate::config::RpcConfig;
use crate::flatten::{codec_pair, Flattener, Unflattener};
use crate::protocol::{write_frame, RpcReply, RpcRequest, RpcResponse};
use crate::registry::TypeRegistry;
use crate::spill::{spill_config, SpillConfig};
use crate::value::LogicalValue;
use crate::{Result, RpcError};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Stream plus the reader state that must survive an abandoned call.
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    /// Set while a request is being written, and when the stream lost framing.
    broken: bool,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(8 * 1024),
            broken: false,
        }
    }

    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.broken = true;
        let result = write_frame(&mut self.stream, payload).await;
        // An oversized frame is rejected before anything is written.
        self.broken = matches!(result, Err(ref e) if !matches!(e, RpcError::Protocol { .. }));
        result
    }

    /// Next complete frame, or `None` once the peer closed the stream.
    ///
    /// Cancel-safe: bytes of a partly received frame stay in `read_buf`.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Some(frame));
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    fn take_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.read_buf.len() < 4 {
            return Ok(None);
        }
        let len_bytes = [
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ];
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > RpcConfig::MAX_MESSAGE_SIZE {
            self.broken = true;
            return Err(RpcError::Protocol {
                message: format!(
                    "message size {} exceeds maximum {}",
                    len,
                    RpcConfig::MAX_MESSAGE_SIZE
                ),
            });
        }

        let needed = 4 + len;
        if self.read_buf.len() < needed {
            self.read_buf.reserve(needed - self.read_buf.len());
            return Ok(None);
        }
        self.read_buf.advance(4);
        Ok(Some(self.read_buf.split_to(len).to_vec()))
    }
}

/// Client connection to an [`RpcServer`](crate::server::RpcServer).
#[derive(Debug)]
pub struct RpcClient {
    conn: Mutex<Connection>,
    addr: SocketAddr,
    next_id: AtomicU64,
    flattener: Flattener,
    unflattener: Unflattener,
}

impl RpcClient {
    /// Connect with the built-in codecs and the process-wide spill location.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with(addr, Arc::new(TypeRegistry::with_builtins()), spill_config()?).await
    }

    /// Connect with a caller-supplied registry and spill location.
    ///
    /// Both ends must agree on the registered kinds and share the spill
    /// directory for large binaries to travel.
    pub async fn connect_with(
        addr: SocketAddr,
        registry: Arc<TypeRegistry>,
        spill: Arc<SpillConfig>,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(RpcConfig::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| RpcError::Transport {
                addr,
                message: format!("connect timed out after {:?}", RpcConfig::CONNECT_TIMEOUT),
            })?
            .map_err(|e| RpcError::Transport {
                addr,
                message: e.to_string(),
            })?;

        debug!("RPC client connected to {}", addr);

        let (flattener, unflattener) = codec_pair(registry, spill);
        Ok(Self {
            conn: Mutex::new(Connection::new(stream)),
            addr,
            next_id: AtomicU64::new(1),
            flattener,
            unflattener,
        })
    }

    /// Poll `addr` until a server accepts connections or `timeout` elapses.
    pub async fn wait_until_alive(addr: SocketAddr, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match TcpStream::connect(addr).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(RpcError::Transport {
                            addr,
                            message: format!("server not alive after {:?}: {}", timeout, e),
                        });
                    }
                }
            }
            tokio::time::sleep(RpcConfig::ALIVE_POLL_INTERVAL).await;
        }
    }

    /// Invoke `operation` on the server with `args`.
    ///
    /// Spill files written for the arguments are removed again when the
    /// request never reaches the server intact.
    pub async fn call(&self, operation: &str, args: Vec<LogicalValue>) -> Result<LogicalValue> {
        let mut request = RpcRequest::new(operation, self.flattener.flatten_all(&args)?);

        let reply = match self.exchange(&mut request).await {
            Ok(reply) => reply,
            Err(e) => {
                self.flattener.spill_config().release(&request.arguments);
                return Err(e);
            }
        };

        debug!("RPC {} -> {}", operation, reply.response.status());

        let result = reply.response.into_result()?;
        self.unflattener.unflatten(&result).map_err(|e| {
            self.unflattener
                .spill_config()
                .release(std::slice::from_ref(&result));
            e
        })
    }

    /// Send `request` under a fresh id and read until its reply arrives.
    async fn exchange(&self, request: &mut RpcRequest) -> Result<RpcReply> {
        let mut conn = self.conn.lock().await;
        if conn.broken {
            return Err(RpcError::Transport {
                addr: self.addr,
                message: "connection unusable after an interrupted call".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        request.id = id;
        let request_bytes = serde_json::to_vec(&*request)?;
        conn.send(&request_bytes)
            .await
            .map_err(|e| self.transport(e))?;

        loop {
            let frame = conn
                .next_frame()
                .await
                .map_err(|e| self.transport(e))?
                .ok_or_else(|| RpcError::Transport {
                    addr: self.addr,
                    message: "connection closed before response".to_string(),
                })?;

            let reply: RpcReply = serde_json::from_slice(&frame).map_err(|e| {
                conn.broken = true;
                RpcError::Protocol {
                    message: format!("Failed to parse RPC response: {}", e),
                }
            })?;

            if reply.id == id {
                return Ok(reply);
            }
            if reply.id != 0 && reply.id < id {
                debug!("Discarding reply {} to an abandoned call", reply.id);
                if let RpcResponse::Ok { result } = &reply.response {
                    self.unflattener
                        .spill_config()
                        .release(std::slice::from_ref(result));
                }
                continue;
            }

            warn!("Reply id {} does not match request {}", reply.id, id);
            conn.broken = true;
            return Err(RpcError::Protocol {
                message: format!("reply id {} does not match request id {}", reply.id, id),
            });
        }
    }

    /// Whether the connection is still open and usable.
    ///
    /// Checks without blocking; a peer that closed its end reports `false`.
    pub async fn is_alive(&self) -> bool {
        let conn = self.conn.lock().await;
        if conn.broken {
            return false;
        }
        let mut buf = [0u8; 1];
        match tokio::time::timeout(Duration::ZERO, conn.stream.peek(&mut buf)).await {
            Err(_) => true, // nothing to read, still open
            Ok(Ok(0)) => false,
            Ok(Ok(_)) => true,
            Ok(Err(_)) => false,
        }
    }

    /// Address of the connected server.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn transport(&self, err: RpcError) -> RpcError {
        match err {
            RpcError::Protocol { .. } => err,
            other => RpcError::Transport {
                addr: self.addr,
                message: other.to_string(),
            },
        }
    }
}
