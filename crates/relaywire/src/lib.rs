//! Remote invocation transports
//!
//! Node behaviors run out of process. This crate ships a node's
//! `(spec, message)` pair to the process implementing that node and returns
//! the transformed message: either over a pooled request/reply socket or as
//! a blocking action call against an execution platform.

mod action;
mod socket;

pub use action::{ActionCall, ActionConfig, ActionInvoker};
pub use socket::{SocketConfig, SocketInvoker, DEFAULT_SOCKET_PORT};

use async_trait::async_trait;
use relaycore::{InvokeError, Message, NodeSpec};

/// Contract shared by both transports: resolve with the transformed message
/// or fail with a typed error. No side channel for partial results.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, node: &NodeSpec, msg: Message) -> Result<Message, InvokeError>;
}
