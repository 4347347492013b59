//! Core abstractions for the relay orchestrator
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the message document, flow records and the derived
//! flow graph, the error taxonomy, execution events, and the capability
//! traits implemented by the transport and context-store crates.

mod context;
mod error;
mod events;
mod flow;
mod graph;
mod handler;
mod message;

pub use context::{ContextKey, ContextLease, SharedContext};
pub use error::{ContextError, FlowError, HandlerError, InvokeError, StructuralError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, ExecutionId};
pub use flow::{NodeRecord, NodeSpec};
pub use graph::{FlowGraph, DEFAULT_INGEST_KIND};
pub use handler::{FlowScope, NodeHandler};
pub use message::Message;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
