use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted while a flow traversal runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    FlowStarted {
        execution_id: ExecutionId,
        flow_id: String,
        timestamp: DateTime<Utc>,
    },
    FlowCompleted {
        execution_id: ExecutionId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeInvoked {
        execution_id: ExecutionId,
        node_id: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: String,
        outputs: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A wired target id did not resolve; that branch was dropped while the
    /// rest of the traversal continued.
    BranchSkipped {
        execution_id: ExecutionId,
        from: String,
        target: String,
        timestamp: DateTime<Utc>,
    },
}

/// Emitter bound to one execution.
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(execution_id: ExecutionId, sender: broadcast::Sender<ExecutionEvent>) -> Self {
        Self {
            execution_id,
            sender,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn flow_started(&self, flow_id: impl Into<String>) {
        let _ = self.sender.send(ExecutionEvent::FlowStarted {
            execution_id: self.execution_id,
            flow_id: flow_id.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn flow_completed(&self, success: bool, duration_ms: u64) {
        let _ = self.sender.send(ExecutionEvent::FlowCompleted {
            execution_id: self.execution_id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    pub fn node_invoked(&self, node_id: impl Into<String>, kind: impl Into<String>) {
        let _ = self.sender.send(ExecutionEvent::NodeInvoked {
            execution_id: self.execution_id,
            node_id: node_id.into(),
            kind: kind.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn node_completed(&self, node_id: impl Into<String>, outputs: usize, duration_ms: u64) {
        let _ = self.sender.send(ExecutionEvent::NodeCompleted {
            execution_id: self.execution_id,
            node_id: node_id.into(),
            outputs,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    pub fn node_failed(&self, node_id: impl Into<String>, error: impl Into<String>) {
        let _ = self.sender.send(ExecutionEvent::NodeFailed {
            execution_id: self.execution_id,
            node_id: node_id.into(),
            error: error.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn branch_skipped(&self, from: impl Into<String>, target: impl Into<String>) {
        let _ = self.sender.send(ExecutionEvent::BranchSkipped {
            execution_id: self.execution_id,
            from: from.into(),
            target: target.into(),
            timestamp: Utc::now(),
        });
    }
}

/// Global event bus
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId) -> EventEmitter {
        EventEmitter::new(execution_id, self.sender.clone())
    }
}
