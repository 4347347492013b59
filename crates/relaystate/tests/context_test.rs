// crates/relaystate/tests/context_test.rs

use relaycore::{ContextError, ContextKey, ContextLease, HandlerError, SharedContext};
use relaystate::{update, CacheLink, LinkState, MemoryContextStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

fn key(name: &str) -> ContextKey {
    ContextKey::new("acme", "flow-1", "tally", "n1", name)
}

#[tokio::test]
async fn test_new_key_reads_null() {
    let store = MemoryContextStore::new();
    let (lease, content) = store.lock_and_read(&key("fresh")).await.unwrap();

    assert!(content.is_null());
    store
        .save_and_unlock(lease, serde_json::json!({"n": 0}))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_saved_content_is_read_back() {
    let store = MemoryContextStore::new();
    let k = key("counter");

    let (lease, _) = store.lock_and_read(&k).await.unwrap();
    store
        .save_and_unlock(lease, serde_json::json!(41))
        .await
        .unwrap();

    let (lease, content) = store.lock_and_read(&k).await.unwrap();
    assert_eq!(content, serde_json::json!(41));
    store.save_and_unlock(lease, content).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_read_modify_write_loses_no_update() {
    let store = Arc::new(MemoryContextStore::new());
    let k = key("counter");

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let store = store.clone();
        let k = k.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                update(store.as_ref(), &k, |content| {
                    let n = content.as_u64().unwrap_or(0) + 1;
                    *content = serde_json::json!(n);
                    Ok(())
                })
                .await
                .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let (lease, content) = store.lock_and_read(&k).await.unwrap();
    assert_eq!(content, serde_json::json!(100), "every increment must land");
    store.save_and_unlock(lease, content).await.unwrap();
}

#[tokio::test]
async fn test_second_locker_waits_for_save() {
    let store = Arc::new(MemoryContextStore::new());
    let k = key("counter");

    let (lease, _) = store.lock_and_read(&k).await.unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let acquired_clone = acquired.clone();
    let store_clone = store.clone();
    let k_clone = k.clone();
    let waiter = tokio::spawn(async move {
        let (lease, content) = store_clone.lock_and_read(&k_clone).await.unwrap();
        acquired_clone.store(true, Ordering::SeqCst);
        store_clone.save_and_unlock(lease, content.clone()).await.unwrap();
        content
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !acquired.load(Ordering::SeqCst),
        "second locker must not get content while the lock is held"
    );

    store
        .save_and_unlock(lease, serde_json::json!("first"))
        .await
        .unwrap();

    let seen = waiter.await.unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert_eq!(
        seen,
        serde_json::json!("first"),
        "second locker observes the first writer's content"
    );
}

#[tokio::test]
async fn test_distinct_keys_do_not_contend() {
    let store = MemoryContextStore::with_lock_timeout(Duration::from_millis(200));

    let (lease_a, _) = store.lock_and_read(&key("a")).await.unwrap();
    // Holding `a` must not delay `b`.
    let (lease_b, _) = store.lock_and_read(&key("b")).await.unwrap();

    store.save_and_unlock(lease_a, serde_json::json!(1)).await.unwrap();
    store.save_and_unlock(lease_b, serde_json::json!(2)).await.unwrap();
}

#[tokio::test]
async fn test_lock_acquisition_times_out() {
    let store = MemoryContextStore::with_lock_timeout(Duration::from_millis(100));
    let k = key("contended");

    let (_held, _) = store.lock_and_read(&k).await.unwrap();

    let err = store.lock_and_read(&k).await.unwrap_err();
    assert!(matches!(err, ContextError::LockTimeout { .. }));
}

#[tokio::test]
async fn test_foreign_lease_is_rejected() {
    let store = MemoryContextStore::new();
    let k = key("counter");

    let (lease, _) = store.lock_and_read(&k).await.unwrap();

    let forged = ContextLease::new(k.clone());
    let err = store
        .save_and_unlock(forged, serde_json::json!(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::StaleLease { .. }));

    // The genuine lease still releases.
    store.save_and_unlock(lease, serde_json::json!(1)).await.unwrap();
}

#[tokio::test]
async fn test_update_releases_lock_when_closure_fails() {
    let store = MemoryContextStore::with_lock_timeout(Duration::from_millis(200));
    let k = key("counter");

    update(&store, &k, |content| {
        *content = serde_json::json!(1);
        Ok(())
    })
    .await
    .unwrap();

    let err = update(&store, &k, |content| {
        *content = serde_json::json!(999);
        Err(HandlerError::Failed("validation failed".to_string()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, HandlerError::Failed(_)));

    // Lock free again and the failed mutation never landed.
    let (lease, content) = store.lock_and_read(&k).await.unwrap();
    assert_eq!(content, serde_json::json!(1));
    store.save_and_unlock(lease, content).await.unwrap();
}

#[tokio::test]
async fn test_scoped_context_getters() {
    let store = MemoryContextStore::new();
    store
        .seed_tenant_context("acme", "units", serde_json::json!("metric"))
        .await;
    store
        .seed_flow_context("acme", "flow-1", "threshold", serde_json::json!(42))
        .await;

    assert_eq!(
        store.tenant_context("acme", "units").await.unwrap(),
        serde_json::json!("metric")
    );
    assert_eq!(
        store.flow_context("acme", "flow-1", "threshold").await.unwrap(),
        serde_json::json!(42)
    );
    assert!(store.tenant_context("acme", "missing").await.unwrap().is_null());
}

#[test]
fn test_link_starts_disconnected() {
    let link = CacheLink::new();
    assert_eq!(link.state(), LinkState::Disconnected);

    // Writes and reads are ignored while the link is down.
    link.put("k", serde_json::json!(1));
    assert_eq!(link.get("k"), None);
    assert_eq!(link.cached_len(), 0);
}

#[test]
fn test_reconnect_flushes_cache_before_reads() {
    let link = CacheLink::new();
    link.mark_connected();

    link.put("device-7", serde_json::json!({"alias": "greenhouse"}));
    assert_eq!(link.cached_len(), 1);
    assert!(link.get("device-7").is_some());

    link.mark_disconnected();
    assert_eq!(link.state(), LinkState::Disconnected);

    link.mark_reconnecting();
    assert_eq!(link.state(), LinkState::Reconnecting, "informational only");

    // Invalidation events may have been missed while down: everything
    // cached before the outage is gone once the link comes back.
    link.mark_connected();
    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(link.cached_len(), 0);
    assert_eq!(link.get("device-7"), None);
}

#[test]
fn test_context_key_renders_full_path() {
    let k = key("count");
    assert_eq!(k.to_string(), "acme:flow-1:tally:n1:count");
}
