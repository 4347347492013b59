use thiserror::Error;

/// Structural problem in a flow definition. Fatal: parsing aborts and no
/// partial graph is returned.
#[derive(Error, Debug, Clone)]
pub enum StructuralError {
    #[error("record {index} has wires but no id")]
    MissingId { index: usize },

    #[error("record '{id}' has wires but no type")]
    MissingKind { id: String },

    #[error("duplicate node id '{id}'")]
    DuplicateId { id: String },
}

/// Remote invocation failure. Branch-fatal; no retry at this layer.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("transport unavailable for {target}: {reason}")]
    TransportUnavailable { target: String, reason: String },

    #[error("invalid response from {target}: {reason}")]
    InvalidResponse { target: String, reason: String },

    #[error("invocation of {target} timed out after {elapsed_ms}ms")]
    Timeout { target: String, elapsed_ms: u64 },

    #[error("action '{action}' failed: {reason}")]
    ActionFailed { action: String, reason: String },
}

/// Context-store failure, surfaced to the node handler that asked for the
/// lock. The handler must propagate it, never continue with default state.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("lock acquisition timed out for {key}")]
    LockTimeout { key: String },

    #[error("write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("stale lease for {key}")]
    StaleLease { key: String },

    #[error("cache link disconnected")]
    Disconnected,

    #[error("context backend error: {0}")]
    Backend(String),
}

/// Failure produced by a node handler. Transport and context failures pass
/// through with their own types; business-logic rejections use `Failed`.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("handler failed: {0}")]
    Failed(String),
}

/// Top-level error for flow operations.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("flow not found: {0}")]
    FlowNotFound(String),

    #[error("no handler registered for node type '{0}'")]
    UnknownNodeKind(String),

    #[error("node '{node_id}' failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: HandlerError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
