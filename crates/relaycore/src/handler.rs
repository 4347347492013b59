use crate::{HandlerError, Message, NodeSpec, SharedContext};
use async_trait::async_trait;

/// Tenancy and provenance metadata supplied to every handler invocation.
#[derive(Debug, Clone)]
pub struct FlowScope {
    pub tenant: String,
    pub flow_id: String,
    pub originator_device_id: Option<String>,
}

impl FlowScope {
    pub fn new(tenant: impl Into<String>, flow_id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            flow_id: flow_id.into(),
            originator_device_id: None,
        }
    }

    pub fn with_originator(mut self, device_id: impl Into<String>) -> Self {
        self.originator_device_id = Some(device_id.into());
        self
    }
}

/// Capability interface implemented by every node handler variant.
///
/// A handler turns `(config, message)` into zero or more output messages.
/// Remote transports implement this by shipping the pair out of process;
/// in-process handlers run directly. Stateful handlers reach shared state
/// through the supplied [`SharedContext`], and must surface a context
/// failure as their own failure rather than continuing with default state.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Node type this handler serves, e.g. "kelvin" or "average".
    fn kind(&self) -> &str;

    async fn handle(
        &self,
        node: &NodeSpec,
        msg: Message,
        scope: &FlowScope,
        ctx: &dyn SharedContext,
    ) -> Result<Vec<Message>, HandlerError>;
}
