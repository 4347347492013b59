use async_trait::async_trait;
use relaycore::{ContextError, ContextKey, ContextLease, SharedContext};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout, Duration};
use uuid::Uuid;

/// In-memory context store.
///
/// Each key owns an async mutex; `lock_and_read` parks the owned guard in
/// the lease table, so the lock stays held until the matching
/// `save_and_unlock` consumes the lease. Lockers of distinct keys never
/// contend.
pub struct MemoryContextStore {
    entries: Mutex<HashMap<String, Arc<Mutex<Value>>>>,
    held: Mutex<HashMap<Uuid, OwnedMutexGuard<Value>>>,
    scoped: Mutex<HashMap<String, Value>>,
    lock_timeout: Duration,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(5))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            scoped: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Seed a read-only tenant-scoped context value.
    pub async fn seed_tenant_context(&self, tenant: &str, name: &str, value: Value) {
        let mut scoped = self.scoped.lock().await;
        scoped.insert(format!("tenant:{}:{}", tenant, name), value);
    }

    /// Seed a read-only flow-scoped context value.
    pub async fn seed_flow_context(&self, tenant: &str, flow_id: &str, name: &str, value: Value) {
        let mut scoped = self.scoped.lock().await;
        scoped.insert(format!("flow:{}:{}:{}", tenant, flow_id, name), value);
    }

    async fn entry_for(&self, key: &ContextKey) -> Arc<Mutex<Value>> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Value::Null)))
            .clone()
    }
}

impl Default for MemoryContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedContext for MemoryContextStore {
    async fn lock_and_read(
        &self,
        key: &ContextKey,
    ) -> Result<(ContextLease, Value), ContextError> {
        let entry = self.entry_for(key).await;
        let guard = timeout(self.lock_timeout, entry.lock_owned())
            .await
            .map_err(|_| ContextError::LockTimeout {
                key: key.to_string(),
            })?;

        let content = guard.clone();
        let lease = ContextLease::new(key.clone());
        self.held.lock().await.insert(lease.token(), guard);
        Ok((lease, content))
    }

    async fn save_and_unlock(
        &self,
        lease: ContextLease,
        content: Value,
    ) -> Result<(), ContextError> {
        let mut held = self.held.lock().await;
        let mut guard = held
            .remove(&lease.token())
            .ok_or_else(|| ContextError::StaleLease {
                key: lease.key().to_string(),
            })?;
        *guard = content;
        // Guard drops here, releasing the key.
        Ok(())
    }

    async fn tenant_context(&self, tenant: &str, name: &str) -> Result<Value, ContextError> {
        let scoped = self.scoped.lock().await;
        Ok(scoped
            .get(&format!("tenant:{}:{}", tenant, name))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn flow_context(
        &self,
        tenant: &str,
        flow_id: &str,
        name: &str,
    ) -> Result<Value, ContextError> {
        let scoped = self.scoped.lock().await;
        Ok(scoped
            .get(&format!("flow:{}:{}:{}", tenant, flow_id, name))
            .cloned()
            .unwrap_or(Value::Null))
    }
}
