use crate::HandlerRegistry;
use relaycore::{
    EventBus, EventEmitter, ExecutionId, FlowError, FlowGraph, FlowScope, HandlerError,
    InvokeError, Message, SharedContext,
};
use std::time::Instant;
use tokio::time::{timeout, Duration};

/// Traversal state: work remains, the stack drained, or a node failed
/// unrecoverably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalStatus {
    Pending,
    Done,
    Failed,
}

/// A branch dropped because its wired target id did not resolve. Reported,
/// never fatal to sibling branches.
#[derive(Debug, Clone)]
pub struct SkippedBranch {
    pub from: String,
    pub target: String,
}

/// Outcome of a completed traversal.
///
/// `message` is the last output of the most recent successful invocation in
/// stack order — with several tail branches this preserves the reference
/// scheduling behavior rather than defining a merge. Callers that need
/// every branch output subscribe to `NodeCompleted` events instead.
#[derive(Debug, Clone)]
pub struct TraversalReport {
    pub execution_id: ExecutionId,
    pub status: TraversalStatus,
    pub message: Message,
    pub invoked: usize,
    pub skipped: Vec<SkippedBranch>,
}

/// Entry on the pending-work stack. Owns its message; fan-out clones the
/// message per successor, so branches never share a mutable value.
struct Pending {
    id: String,
    msg: Message,
    from: String,
}

/// Walks a flow graph message by message.
///
/// The traversal is an explicit iterative loop over a LIFO work stack, so
/// arbitrarily deep or wide graphs never grow the call stack. Siblings run
/// depth-first in last-pushed-first-popped order; no interleaving between
/// parallel branches is guaranteed beyond a node running after its own
/// predecessors.
pub struct FlowExecutor {
    invoke_timeout: Duration,
}

impl FlowExecutor {
    pub fn new(invoke_timeout: Duration) -> Self {
        Self { invoke_timeout }
    }

    /// Execute a flow and return the final message.
    pub async fn execute(
        &self,
        graph: &FlowGraph,
        scope: &FlowScope,
        registry: &HandlerRegistry,
        context: &dyn SharedContext,
        event_bus: &EventBus,
        initial: Message,
    ) -> Result<TraversalReport, FlowError> {
        let execution_id = ExecutionId::new_v4();
        let emitter = event_bus.create_emitter(execution_id);
        let started = Instant::now();

        emitter.flow_started(&scope.flow_id);
        tracing::info!(flow_id = %scope.flow_id, %execution_id, "starting traversal");

        let result = self
            .traverse(graph, scope, registry, context, &emitter, execution_id, initial)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        emitter.flow_completed(result.is_ok(), duration_ms);
        result
    }

    async fn traverse(
        &self,
        graph: &FlowGraph,
        scope: &FlowScope,
        registry: &HandlerRegistry,
        context: &dyn SharedContext,
        emitter: &EventEmitter,
        execution_id: ExecutionId,
        initial: Message,
    ) -> Result<TraversalReport, FlowError> {
        let mut stack: Vec<Pending> = Vec::new();
        // Heads are pushed in reverse so the first head in definition order
        // is popped first.
        for head in graph.heads().iter().rev() {
            stack.push(Pending {
                id: head.clone(),
                msg: initial.clone(),
                from: String::new(),
            });
        }

        let mut final_msg = initial;
        let mut invoked = 0usize;
        let mut skipped = Vec::new();

        while let Some(Pending { id, msg, from }) = stack.pop() {
            let Some(node) = graph.node(&id) else {
                tracing::warn!(target = %id, from = %from, "wired target does not exist, dropping branch");
                emitter.branch_skipped(&from, &id);
                skipped.push(SkippedBranch { from, target: id });
                continue;
            };

            let handler = registry
                .resolve(&node.kind)
                .ok_or_else(|| FlowError::UnknownNodeKind(node.kind.clone()))?;

            emitter.node_invoked(&node.id, &node.kind);
            let invocation_start = Instant::now();

            let outcome = timeout(
                self.invoke_timeout,
                handler.handle(node, msg, scope, context),
            )
            .await;
            let duration_ms = invocation_start.elapsed().as_millis() as u64;

            let outputs = match outcome {
                Err(_) => {
                    emitter.node_failed(&node.id, "invocation deadline exceeded");
                    tracing::error!(node_id = %node.id, "invocation deadline exceeded");
                    return Err(FlowError::Node {
                        node_id: node.id.clone(),
                        source: HandlerError::Invoke(InvokeError::Timeout {
                            target: node.kind.clone(),
                            elapsed_ms: duration_ms,
                        }),
                    });
                }
                Ok(Err(e)) => {
                    emitter.node_failed(&node.id, e.to_string());
                    tracing::error!(node_id = %node.id, error = %e, "node failed");
                    return Err(FlowError::Node {
                        node_id: node.id.clone(),
                        source: e,
                    });
                }
                Ok(Ok(outputs)) => outputs,
            };

            invoked += 1;
            emitter.node_completed(&node.id, outputs.len(), duration_ms);
            tracing::debug!(node_id = %node.id, outputs = outputs.len(), duration_ms, "node completed");

            if let Some(last) = outputs.last() {
                final_msg = last.clone();
            }
            // Every output fans out to every wire; an empty output set ends
            // the branch quietly.
            for output in &outputs {
                for wire in &node.wires {
                    stack.push(Pending {
                        id: wire.clone(),
                        msg: output.clone(),
                        from: node.id.clone(),
                    });
                }
            }
        }

        Ok(TraversalReport {
            execution_id,
            status: TraversalStatus::Done,
            message: final_msg,
            invoked,
            skipped,
        })
    }
}
