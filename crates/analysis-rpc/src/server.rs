//! TCP RPC server.
//!
//! Lifecycle: `Created -> Bound -> Serving -> Stopped`. Handlers are added
//! while `Bound` and the table is frozen once `serve` starts. Each accepted
//! connection runs in its own task and handles one request at a time; the
//! unflatten/invoke/flatten step runs on the blocking pool so a slow handler
//! never holds up accepting or serving other connections.
//!
//! # Shutdown
//!
//! A [`ShutdownHandle`] stops the accept loop. Connections finish the
//! request they are processing, then close; `serve` returns once all of
//! them have.

use crate::config::RpcConfig;
use crate::flatten::{codec_pair, Flattener, Unflattener};
use crate::handler::{Handler, HandlerTable};
use crate::protocol::{read_frame, write_frame, RpcReply, RpcRequest, RpcResponse};
use crate::registry::TypeRegistry;
use crate::spill::{spill_config, SpillConfig};
use crate::{Result, RpcError};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Bound,
    Serving,
    Stopped,
}

impl ServerState {
    /// Lowercase name, as used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Created => "created",
            ServerState::Bound => "bound",
            ServerState::Serving => "serving",
            ServerState::Stopped => "stopped",
        }
    }
}

/// Signals a serving [`RpcServer`] to stop accepting connections.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the server to stop. Idempotent; in-flight requests still complete.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Everything a request needs, shared read-only by all connections.
struct Dispatcher {
    handlers: HandlerTable,
    flattener: Flattener,
    unflattener: Unflattener,
}

impl Dispatcher {
    /// Turn one request frame into exactly one reply.
    fn dispatch(&self, frame: &[u8]) -> RpcReply {
        match serde_json::from_slice::<RpcRequest>(frame) {
            Ok(request) => RpcReply::new(request.id, self.respond(request)),
            Err(e) => {
                warn!("Malformed request: {}", e);
                let id = serde_json::from_slice::<serde_json::Value>(frame)
                    .ok()
                    .and_then(|v| v.get("id").and_then(serde_json::Value::as_u64))
                    .unwrap_or(0);
                RpcReply::new(
                    id,
                    RpcResponse::ArgumentDecodeError {
                        message: format!("Malformed request: {}", e),
                    },
                )
            }
        }
    }

    /// Spill files referenced by `request` are consumed or removed on every path.
    fn respond(&self, request: RpcRequest) -> RpcResponse {
        let operation = request.operation.as_str();

        let Some(handler) = self.handlers.get(operation) else {
            debug!("No handler for {}", operation);
            self.unflattener.spill_config().release(&request.arguments);
            return RpcResponse::no_handler(operation);
        };

        let args = match self.unflattener.unflatten_all(&request.arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!("Argument decode failed for {}: {}", operation, e);
                self.unflattener.spill_config().release(&request.arguments);
                return RpcResponse::ArgumentDecodeError {
                    message: e.to_string(),
                };
            }
        };

        if let Some(expected) = handler.arity() {
            if args.len() != expected {
                return RpcResponse::ArgumentDecodeError {
                    message: format!(
                        "{} expects {} arguments, got {}",
                        operation,
                        expected,
                        args.len()
                    ),
                };
            }
        }

        debug!("RPC call: {} with {} arguments", operation, args.len());

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(args)));
        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                debug!("Handler {} raised {}", operation, e);
                return RpcResponse::HandlerError {
                    kind: e.kind,
                    message: e.message,
                };
            }
            Err(panic) => {
                error!("Handler {} panicked", operation);
                return RpcResponse::HandlerError {
                    kind: "panic".to_string(),
                    message: panic_message(&*panic),
                };
            }
        };

        match self.flattener.flatten(&value) {
            Ok(result) => RpcResponse::Ok { result },
            Err(e) => {
                warn!("Result encode failed for {}: {}", operation, e);
                RpcResponse::ResultEncodeError {
                    message: e.to_string(),
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// RPC server owning a handler table and codec registry.
pub struct RpcServer {
    state: ServerState,
    listener: Option<TcpListener>,
    addr: Option<SocketAddr>,
    handlers: HandlerTable,
    flattener: Flattener,
    unflattener: Unflattener,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl RpcServer {
    /// Server with the built-in codecs and the process-wide spill location.
    pub fn new() -> Result<Self> {
        Ok(Self::with_codecs(
            Arc::new(TypeRegistry::with_builtins()),
            spill_config()?,
        ))
    }

    /// Server with a caller-supplied registry and spill location.
    pub fn with_codecs(registry: Arc<TypeRegistry>, spill: Arc<SpillConfig>) -> Self {
        let (flattener, unflattener) = codec_pair(registry, spill);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: ServerState::Created,
            listener: None,
            addr: None,
            handlers: HandlerTable::new(),
            flattener,
            unflattener,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Bind to `host:port`. Port 0 picks an ephemeral port; see [`Self::local_addr`].
    pub async fn bind(&mut self, host: &str, port: u16) -> Result<SocketAddr> {
        self.expect_state(ServerState::Created, "bind")?;

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| RpcError::Bind {
                addr: format!("{}:{}", host, port),
                message: e.to_string(),
                source: Some(e),
            })?;
        let addr = listener.local_addr()?;

        info!("RPC server bound to {}", addr);

        self.listener = Some(listener);
        self.addr = Some(addr);
        self.state = ServerState::Bound;
        Ok(addr)
    }

    /// Address actually bound, once bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Bound port, once bound.
    pub fn port(&self) -> Option<u16> {
        self.addr.map(|a| a.port())
    }

    /// Register `handler` under `name`. Only valid while bound.
    pub fn add_handler<H: Handler>(&mut self, name: impl Into<String>, handler: H) -> Result<()> {
        self.expect_state(ServerState::Bound, "add a handler")?;
        self.handlers.insert(name, Arc::new(handler))
    }

    /// Registered handlers. Empty while serving; restored once `serve` returns.
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Handle that stops this server from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Stop a running `serve`. Equivalent to [`ShutdownHandle::shutdown`].
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Accept connections until shut down, then wait for in-flight requests.
    pub async fn serve(&mut self) -> Result<()> {
        self.expect_state(ServerState::Bound, "serve")?;
        let listener = self.listener.take().ok_or(RpcError::InvalidState {
            operation: "serve",
            state: "unbound",
        })?;
        self.state = ServerState::Serving;

        let dispatcher = Arc::new(Dispatcher {
            handlers: std::mem::take(&mut self.handlers),
            flattener: self.flattener.clone(),
            unflattener: self.unflattener.clone(),
        });

        info!(
            "RPC server serving {} handlers on {:?}",
            dispatcher.handlers.len(),
            self.addr
        );

        let result = accept_loop(listener, dispatcher.clone(), self.shutdown_tx.subscribe()).await;

        // Table stays inspectable after serving.
        if let Ok(dispatcher) = Arc::try_unwrap(dispatcher) {
            self.handlers = dispatcher.handlers;
        }
        self.state = ServerState::Stopped;
        info!("RPC server stopped");
        result
    }

    /// Spawn [`Self::serve`] on the runtime and return a handle to it.
    pub fn start(mut self) -> Result<RpcServerHandle> {
        self.expect_state(ServerState::Bound, "start")?;
        let addr = self.addr.ok_or(RpcError::InvalidState {
            operation: "start",
            state: "unbound",
        })?;
        let shutdown = self.shutdown_handle();
        let task = tokio::spawn(async move { self.serve().await });

        Ok(RpcServerHandle {
            addr,
            port: addr.port(),
            shutdown,
            task: Some(task),
        })
    }

    /// Release the bound socket. Valid in any state; repeated calls are no-ops.
    pub fn close(&mut self) {
        if self.listener.take().is_some() {
            debug!("Closed listener on {:?}", self.addr);
        }
        self.shutdown_tx.send_replace(true);
        self.state = ServerState::Stopped;
    }

    fn expect_state(&self, expected: ServerState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RpcError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let active_connections = Arc::new(AtomicUsize::new(0));
    let mut connections = JoinSet::new();

    loop {
        if *shutdown_rx.borrow_and_update() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("RPC server shutting down");
                break;
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        let current = active_connections.load(Ordering::Relaxed);
                        if current >= RpcConfig::MAX_CONNECTIONS {
                            warn!(
                                "Rejecting connection from {}: at max capacity ({})",
                                peer_addr,
                                RpcConfig::MAX_CONNECTIONS
                            );
                            continue;
                        }

                        active_connections.fetch_add(1, Ordering::Relaxed);
                        let dispatcher = dispatcher.clone();
                        let conns = active_connections.clone();
                        let mut conn_shutdown = shutdown_rx.clone();

                        connections.spawn(async move {
                            debug!("Connection from {}", peer_addr);
                            if let Err(e) = handle_connection(stream, dispatcher, &mut conn_shutdown).await {
                                debug!("Connection {} ended: {}", peer_addr, e);
                            }
                            conns.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
        }
    }

    drop(listener);

    let in_flight = connections.len();
    if in_flight > 0 {
        debug!("Waiting for {} connections to finish", in_flight);
    }
    while connections.join_next().await.is_some() {}

    Ok(())
}

async fn handle_connection(
    mut stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.split();

    loop {
        if *shutdown_rx.borrow_and_update() {
            return Ok(());
        }

        let frame = tokio::select! {
            result = read_frame(&mut reader) => {
                match result? {
                    Some(f) => f,
                    None => return Ok(()), // Clean disconnect
                }
            }
            _ = shutdown_rx.changed() => {
                return Ok(()); // Server shutting down
            }
        };

        let job = dispatcher.clone();
        let reply = tokio::task::spawn_blocking(move || job.dispatch(&frame))
            .await
            .unwrap_or_else(|e| {
                RpcReply::new(
                    0,
                    RpcResponse::HandlerError {
                        kind: "panic".to_string(),
                        message: e.to_string(),
                    },
                )
            });

        match serde_json::to_vec(&reply) {
            Ok(reply_bytes) => write_frame(&mut writer, &reply_bytes).await?,
            Err(e) => {
                if let RpcResponse::Ok { result } = &reply.response {
                    dispatcher.flattener.spill_config().release(std::slice::from_ref(result));
                }
                return Err(e.into());
            }
        }
    }
}

/// Handle to a server running in a background task.
pub struct RpcServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    shutdown: ShutdownHandle,
    task: Option<tokio::task::JoinHandle<Result<()>>>,
}

impl RpcServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections; in-flight requests still complete.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Wait for the serve task to return.
    pub async fn wait(mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task.await.map_err(|e| RpcError::Io {
                message: format!("server task failed: {}", e),
                source: None,
            })?,
            None => Ok(()),
        }
    }

    /// Shut down and wait for in-flight requests to finish.
    pub async fn stop(self) -> Result<()> {
        self.shutdown();
        self.wait().await
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{with_arity, HandlerError, HandlerResult};
    use crate::value::LogicalValue;
    use crate::wire::WireNode;
    use serde_json::json;

    fn echo(args: Vec<LogicalValue>) -> HandlerResult {
        Ok(LogicalValue::Sequence(args))
    }

    fn test_server() -> RpcServer {
        RpcServer::with_codecs(
            Arc::new(TypeRegistry::with_builtins()),
            Arc::new(SpillConfig::default()),
        )
    }

    async fn exchange(addr: SocketAddr, request: &RpcRequest) -> RpcResponse {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer) = stream.split();
        write_frame(&mut writer, &serde_json::to_vec(request).unwrap())
            .await
            .unwrap();
        let bytes = read_frame(&mut reader).await.unwrap().unwrap();
        let reply: RpcReply = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(reply.id, request.id);
        reply.response
    }

    fn scalar(payload: serde_json::Value) -> WireNode {
        WireNode::new("scalar", payload)
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let mut server = test_server();
        assert_eq!(server.state(), ServerState::Created);

        let addr = server.bind("127.0.0.1", 0).await.unwrap();
        assert!(addr.port() > 0);
        assert_eq!(server.port(), Some(addr.port()));
        assert_eq!(server.state(), ServerState::Bound);

        server.close();
        assert_eq!(server.state(), ServerState::Stopped);
        server.close();
    }

    #[tokio::test]
    async fn test_bind_port_in_use_fails() {
        let mut first = test_server();
        let addr = first.bind("127.0.0.1", 0).await.unwrap();

        let mut second = test_server();
        let result = second.bind("127.0.0.1", addr.port()).await;
        assert!(matches!(result, Err(RpcError::Bind { .. })));
        assert_eq!(second.state(), ServerState::Created);
    }

    #[tokio::test]
    async fn test_add_handler_requires_bound_state() {
        let mut server = test_server();
        let result = server.add_handler("echo", echo);
        assert!(matches!(result, Err(RpcError::InvalidState { .. })));

        server.bind("127.0.0.1", 0).await.unwrap();
        server.add_handler("echo", echo).unwrap();
        let result = server.add_handler("echo", echo);
        assert!(matches!(result, Err(RpcError::DuplicateHandler { .. })));
    }

    #[tokio::test]
    async fn test_serve_requires_bind() {
        let mut server = test_server();
        assert!(matches!(
            server.serve().await,
            Err(RpcError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_success_and_faults() {
        let mut server = test_server();
        server.bind("127.0.0.1", 0).await.unwrap();
        server.add_handler("echo", echo).unwrap();
        server
            .add_handler("fail", |_args: Vec<LogicalValue>| -> HandlerResult {
                Err(HandlerError::type_error("bad arg"))
            })
            .unwrap();
        server
            .add_handler("pair", with_arity(2, echo))
            .unwrap();
        let handle = server.start().unwrap();

        let response = exchange(handle.addr(), &RpcRequest::new("echo", vec![scalar(json!(1))])).await;
        assert_eq!(
            response,
            RpcResponse::Ok {
                result: WireNode::new("sequence", json!([{"type": "scalar", "payload": 1}])),
            }
        );

        let response = exchange(handle.addr(), &RpcRequest::new("nope", vec![])).await;
        assert_eq!(
            response,
            RpcResponse::NoHandler {
                message: "No handler registered for nope".to_string()
            }
        );

        let response = exchange(handle.addr(), &RpcRequest::new("fail", vec![])).await;
        assert_eq!(
            response,
            RpcResponse::HandlerError {
                kind: "TypeError".to_string(),
                message: "bad arg".to_string()
            }
        );

        let response = exchange(handle.addr(), &RpcRequest::new("pair", vec![scalar(json!(1))])).await;
        assert_eq!(response.status(), "argument_decode_error");

        let bogus = WireNode::new("not_a_kind", json!(null));
        let response = exchange(handle.addr(), &RpcRequest::new("echo", vec![bogus])).await;
        assert_eq!(response.status(), "argument_decode_error");

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unencodable_result_is_result_encode_fault() {
        let mut server = RpcServer::with_codecs(
            Arc::new({
                // Decodes scalars but cannot encode sequences.
                let mut registry = TypeRegistry::with_builtins();
                registry.register_fn(
                    "sequence",
                    |_| false,
                    |_, _| Err(RpcError::encode("unreachable")),
                    |_| true,
                    |_, _| Err(RpcError::decode("unsupported")),
                );
                registry
            }),
            Arc::new(SpillConfig::default()),
        );
        server.bind("127.0.0.1", 0).await.unwrap();
        server.add_handler("echo", echo).unwrap();
        let handle = server.start().unwrap();

        let response = exchange(handle.addr(), &RpcRequest::new("echo", vec![scalar(json!(1))])).await;
        assert_eq!(response.status(), "result_encode_error");

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_kill_server() {
        let mut server = test_server();
        server.bind("127.0.0.1", 0).await.unwrap();
        server
            .add_handler("boom", |_args: Vec<LogicalValue>| -> HandlerResult {
                panic!("kaboom")
            })
            .unwrap();
        server.add_handler("echo", echo).unwrap();
        let handle = server.start().unwrap();

        let response = exchange(handle.addr(), &RpcRequest::new("boom", vec![])).await;
        assert_eq!(
            response,
            RpcResponse::HandlerError {
                kind: "panic".to_string(),
                message: "kaboom".to_string()
            }
        );

        let response = exchange(handle.addr(), &RpcRequest::new("echo", vec![])).await;
        assert_eq!(response.status(), "ok");

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_request_gets_a_response() {
        let mut server = test_server();
        server.bind("127.0.0.1", 0).await.unwrap();
        let handle = server.start().unwrap();

        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        let (mut reader, mut writer) = stream.split();
        write_frame(&mut writer, b"not valid json").await.unwrap();
        let bytes = read_frame(&mut reader).await.unwrap().unwrap();
        let reply: RpcReply = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(reply.id, 0);
        assert_eq!(reply.response.status(), "argument_decode_error");

        // A readable id is echoed even when the rest is malformed.
        write_frame(&mut writer, br#"{"id": 9, "operation": 5}"#).await.unwrap();
        let bytes = read_frame(&mut reader).await.unwrap().unwrap();
        let reply: RpcReply = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(reply.id, 9);
        assert_eq!(reply.response.status(), "argument_decode_error");

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reply_echoes_request_id() {
        let mut server = test_server();
        server.bind("127.0.0.1", 0).await.unwrap();
        server.add_handler("echo", echo).unwrap();
        let handle = server.start().unwrap();

        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        let (mut reader, mut writer) = stream.split();
        for id in [5u64, 6, 42] {
            let request = RpcRequest::new("echo", vec![]).with_id(id);
            write_frame(&mut writer, &serde_json::to_vec(&request).unwrap())
                .await
                .unwrap();
            let bytes = read_frame(&mut reader).await.unwrap().unwrap();
            let reply: RpcReply = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(reply.id, id);
        }

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unconsumed_argument_spills_are_removed() {
        let spill_dir = tempfile::TempDir::new().unwrap();
        let registry = Arc::new(TypeRegistry::with_builtins());
        let spill = Arc::new(SpillConfig::new(spill_dir.path(), 4));
        let sender = Flattener::new(registry.clone(), spill.clone());
        let spill_files = || std::fs::read_dir(spill_dir.path()).unwrap().count();

        let mut server = RpcServer::with_codecs(registry, spill);
        server.bind("127.0.0.1", 0).await.unwrap();
        server.add_handler("echo", echo).unwrap();
        let handle = server.start().unwrap();

        let big = || LogicalValue::from(vec![7u8; 64]);

        let arguments = sender.flatten_all(&[big(), big()]).unwrap();
        assert_eq!(spill_files(), 2);
        let response = exchange(handle.addr(), &RpcRequest::new("cat_invalid", arguments)).await;
        assert_eq!(response.status(), "no_handler");
        assert_eq!(spill_files(), 0);

        // Decoding stops at the bad node, before the spilled one.
        let mut arguments = vec![WireNode::new("not_a_kind", json!(null))];
        arguments.extend(sender.flatten_all(&[big()]).unwrap());
        assert_eq!(spill_files(), 1);
        let response = exchange(handle.addr(), &RpcRequest::new("echo", arguments)).await;
        assert_eq!(response.status(), "argument_decode_error");
        assert_eq!(spill_files(), 0);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_request_finish() {
        let mut server = test_server();
        server.bind("127.0.0.1", 0).await.unwrap();
        server
            .add_handler("slow", |_args: Vec<LogicalValue>| -> HandlerResult {
                std::thread::sleep(std::time::Duration::from_millis(300));
                Ok(LogicalValue::from("done"))
            })
            .unwrap();
        let handle = server.start().unwrap();
        let addr = handle.addr();

        let call = tokio::spawn(async move { exchange(addr, &RpcRequest::new("slow", vec![])).await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.stop().await.unwrap();

        let response = call.await.unwrap();
        assert_eq!(
            response,
            RpcResponse::Ok {
                result: scalar(json!("done"))
            }
        );

        // No new connections after shutdown.
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_before_serve_returns_immediately() {
        let mut server = test_server();
        server.bind("127.0.0.1", 0).await.unwrap();
        server.shutdown_handle().shutdown();
        server.serve().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
