use crate::{FlowExecutor, HandlerRegistry, TraversalReport};
use relaycore::{
    EventBus, FlowError, FlowGraph, FlowScope, Message, NodeRecord, SharedContext,
    DEFAULT_INGEST_KIND,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;

/// Main runtime for executing flows
pub struct FlowRuntime {
    registry: Arc<HandlerRegistry>,
    executor: Arc<FlowExecutor>,
    event_bus: Arc<EventBus>,
    context: Arc<dyn SharedContext>,
    flows: Arc<RwLock<HashMap<String, FlowGraph>>>,
    ingest_kind: String,
}

impl FlowRuntime {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        context: Arc<dyn SharedContext>,
        config: RuntimeConfig,
    ) -> Self {
        let executor = Arc::new(FlowExecutor::new(config.invoke_timeout));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            executor,
            event_bus,
            context,
            flows: Arc::new(RwLock::new(HashMap::new())),
            ingest_kind: config.ingest_kind,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Parse and register a flow definition under an id.
    pub async fn register_flow(
        &self,
        flow_id: impl Into<String>,
        records: &[NodeRecord],
    ) -> Result<(), FlowError> {
        let graph = FlowGraph::parse(records, &self.ingest_kind)?;
        self.flows.write().await.insert(flow_id.into(), graph);
        Ok(())
    }

    /// Execute a registered flow by id.
    pub async fn execute_flow(
        &self,
        flow_id: &str,
        scope: &FlowScope,
        initial: Message,
    ) -> Result<TraversalReport, FlowError> {
        let flows = self.flows.read().await;
        let graph = flows
            .get(flow_id)
            .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))?;

        self.executor
            .execute(
                graph,
                scope,
                &self.registry,
                self.context.as_ref(),
                &self.event_bus,
                initial,
            )
            .await
    }

    /// Execute a parsed graph directly (without registration).
    pub async fn execute(
        &self,
        graph: &FlowGraph,
        scope: &FlowScope,
        initial: Message,
    ) -> Result<TraversalReport, FlowError> {
        self.executor
            .execute(
                graph,
                scope,
                &self.registry,
                self.context.as_ref(),
                &self.event_bus,
                initial,
            )
            .await
    }

    /// Subscribe to execution events.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<relaycore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Deadline applied to every node invocation.
    pub invoke_timeout: Duration,
    pub event_buffer_size: usize,
    /// Node type marking ingestion (head) nodes when parsing definitions.
    pub ingest_kind: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            invoke_timeout: Duration::from_secs(30),
            event_buffer_size: 1000,
            ingest_kind: DEFAULT_INGEST_KIND.to_string(),
        }
    }
}
