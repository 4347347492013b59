use crate::Invoker;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use relaycore::{FlowScope, HandlerError, InvokeError, Message, NodeHandler, NodeSpec, SharedContext};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Port node processes listen on in the reference deployment.
pub const DEFAULT_SOCKET_PORT: u16 = 5555;

/// Configuration for the socket transport.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub port: u16,
    /// Deadline covering connect, send and reply for a single invocation.
    pub timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SOCKET_PORT,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Request frame: the node spec and the message, as one JSON document.
#[derive(Serialize)]
struct InvokeFrame<'a> {
    node: &'a NodeSpec,
    msg: serde_json::Value,
}

type Conn = Framed<TcpStream, LengthDelimitedCodec>;

/// Request/reply socket transport.
///
/// One persistent connection per target, created lazily on first use and
/// reused afterwards. A connection carries exactly one outstanding request
/// at a time; a second call to the same target waits for the first reply
/// while calls to other targets proceed on their own connections.
pub struct SocketInvoker {
    config: SocketConfig,
    pool: Mutex<HashMap<String, Arc<Mutex<Option<Conn>>>>>,
}

impl SocketInvoker {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            pool: Mutex::new(HashMap::new()),
        }
    }

    /// Target address for a node: `tcp://<host>:<port>`, where the host is
    /// the node's `host` config override or its type name.
    pub fn target_for(&self, node: &NodeSpec) -> String {
        let host = node.config_str("host").unwrap_or(&node.kind);
        format!("tcp://{}:{}", host, self.config.port)
    }

    async fn slot_for(&self, target: &str) -> Arc<Mutex<Option<Conn>>> {
        let mut pool = self.pool.lock().await;
        pool.entry(target.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn connect(target: &str) -> io::Result<Conn> {
        let addr = target.strip_prefix("tcp://").unwrap_or(target);
        let stream = TcpStream::connect(addr).await?;
        Ok(Framed::new(stream, LengthDelimitedCodec::new()))
    }

    async fn exchange(conn: &mut Conn, payload: Vec<u8>) -> io::Result<Vec<u8>> {
        conn.send(payload.into()).await?;
        match conn.next().await {
            Some(frame) => Ok(frame?.to_vec()),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection closed before reply",
            )),
        }
    }

    fn unavailable(target: &str, reason: impl ToString) -> InvokeError {
        InvokeError::TransportUnavailable {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Invoker for SocketInvoker {
    async fn invoke(&self, node: &NodeSpec, msg: Message) -> Result<Message, InvokeError> {
        let target = self.target_for(node);
        let payload = serde_json::to_vec(&InvokeFrame {
            node,
            msg: msg.to_value(),
        })
        .map_err(|e| Self::unavailable(&target, format!("request encoding: {}", e)))?;

        let slot = self.slot_for(&target).await;
        // Held for the whole exchange: the request/reply discipline permits
        // one outstanding request per connection.
        let mut conn_guard = slot.lock().await;

        if conn_guard.is_none() {
            tracing::debug!(%target, "opening socket connection");
            let connected = timeout(self.config.timeout, Self::connect(&target))
                .await
                .map_err(|_| InvokeError::Timeout {
                    target: target.clone(),
                    elapsed_ms: self.config.timeout.as_millis() as u64,
                })?
                .map_err(|e| Self::unavailable(&target, e))?;
            *conn_guard = Some(connected);
        }

        let conn = conn_guard.as_mut().unwrap();
        let reply = match timeout(self.config.timeout, Self::exchange(conn, payload)).await {
            Err(_) => {
                // The reply may still arrive later and desynchronize the
                // request/reply pairing, so the connection is discarded.
                *conn_guard = None;
                return Err(InvokeError::Timeout {
                    target,
                    elapsed_ms: self.config.timeout.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                *conn_guard = None;
                return Err(Self::unavailable(&target, e));
            }
            Ok(Ok(bytes)) => bytes,
        };

        let value: serde_json::Value =
            serde_json::from_slice(&reply).map_err(|e| InvokeError::InvalidResponse {
                target: target.clone(),
                reason: e.to_string(),
            })?;
        Message::from_value(value).ok_or_else(|| InvokeError::InvalidResponse {
            target,
            reason: "reply is not a JSON object".to_string(),
        })
    }
}

#[async_trait]
impl NodeHandler for SocketInvoker {
    fn kind(&self) -> &str {
        "remote.socket"
    }

    async fn handle(
        &self,
        node: &NodeSpec,
        msg: Message,
        _scope: &FlowScope,
        _ctx: &dyn SharedContext,
    ) -> Result<Vec<Message>, HandlerError> {
        let reply = self.invoke(node, msg).await?;
        Ok(vec![reply])
    }
}
