use relaycore::{ContextKey, HandlerError, SharedContext};
use serde_json::Value;

/// Scoped read-modify-write against one context key.
///
/// Locks, runs the mutation closure, then saves and unlocks on every exit
/// path: a closure failure releases the lock with the pre-mutation content
/// and propagates the handler's own error. Call sites cannot leave a key
/// locked.
pub async fn update<F>(
    store: &dyn SharedContext,
    key: &ContextKey,
    mutate: F,
) -> Result<Value, HandlerError>
where
    F: FnOnce(&mut Value) -> Result<(), HandlerError> + Send,
{
    let (lease, mut content) = store.lock_and_read(key).await?;
    let original = content.clone();

    match mutate(&mut content) {
        Ok(()) => {
            store.save_and_unlock(lease, content.clone()).await?;
            Ok(content)
        }
        Err(e) => {
            if let Err(unlock_err) = store.save_and_unlock(lease, original).await {
                tracing::warn!(key = %key, error = %unlock_err, "failed to restore context while unwinding");
            }
            Err(e)
        }
    }
}
