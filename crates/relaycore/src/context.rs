use crate::ContextError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Key identifying one piece of shared node state.
///
/// Uniqueness is `(tenant, flow, node type, node id, context name)`; the
/// rendered colon-joined path is what backends persist under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub tenant: String,
    pub flow_id: String,
    pub node_kind: String,
    pub node_id: String,
    pub name: String,
}

impl ContextKey {
    pub fn new(
        tenant: impl Into<String>,
        flow_id: impl Into<String>,
        node_kind: impl Into<String>,
        node_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            flow_id: flow_id.into(),
            node_kind: node_kind.into(),
            node_id: node_id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.tenant, self.flow_id, self.node_kind, self.node_id, self.name
        )
    }
}

/// Proof of an exclusive lock held on a context key.
///
/// Handed out by `lock_and_read` and consumed by exactly one
/// `save_and_unlock`; the store matches the token against the lock it
/// granted and rejects stale or foreign leases.
#[derive(Debug)]
pub struct ContextLease {
    key: ContextKey,
    token: Uuid,
}

impl ContextLease {
    pub fn new(key: ContextKey) -> Self {
        Self {
            key,
            token: Uuid::new_v4(),
        }
    }

    pub fn key(&self) -> &ContextKey {
        &self.key
    }

    pub fn token(&self) -> Uuid {
        self.token
    }
}

/// Locked shared-context store as seen by node handlers.
///
/// `lock_and_read` then `save_and_unlock` is the atomic read-modify-write
/// cycle that prevents lost updates when concurrent flow executions touch
/// the same aggregate. The lock is released exactly once per acquisition,
/// on success or failure; a failed write still releases and reports the
/// failure to the caller.
#[async_trait]
pub trait SharedContext: Send + Sync {
    /// Acquire the exclusive lock on `key` and return current content, or
    /// `Value::Null` if the key is new. Blocks other lockers of the same
    /// key; fails with `ContextError::LockTimeout` once the bounded retry
    /// budget is spent.
    async fn lock_and_read(&self, key: &ContextKey)
        -> Result<(ContextLease, Value), ContextError>;

    /// Write `content` back and release the lock unconditionally.
    async fn save_and_unlock(
        &self,
        lease: ContextLease,
        content: Value,
    ) -> Result<(), ContextError>;

    /// Read-only tenant-scoped context, served through the cache link.
    async fn tenant_context(&self, tenant: &str, name: &str) -> Result<Value, ContextError>;

    /// Read-only flow-scoped context, served through the cache link.
    async fn flow_context(
        &self,
        tenant: &str,
        flow_id: &str,
        name: &str,
    ) -> Result<Value, ContextError>;
}
