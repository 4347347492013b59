use relaycore::NodeHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of node handler instances.
///
/// Maps a node type to the handler serving it. The optional default handler
/// catches every unregistered type — in the reference deployment that is
/// the socket transport, whose target address derives from the type name.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
    default: Option<Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default: None,
        }
    }

    /// Register a handler under its own type identifier.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let kind = handler.kind().to_string();
        tracing::info!("registering handler for node type: {}", kind);
        self.handlers.insert(kind, handler);
    }

    /// Register a handler under an explicit type, e.g. a retry-decorated
    /// transport serving a node type it does not name itself.
    pub fn register_kind(&mut self, kind: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Handler used for any node type without an explicit entry.
    pub fn set_default(&mut self, handler: Arc<dyn NodeHandler>) {
        self.default = Some(handler);
    }

    pub fn resolve(&self, kind: &str) -> Option<&Arc<dyn NodeHandler>> {
        self.handlers.get(kind).or(self.default.as_ref())
    }

    pub fn list_kinds(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
