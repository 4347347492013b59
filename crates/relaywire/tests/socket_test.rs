// crates/relaywire/tests/socket_test.rs

use futures_util::{SinkExt, StreamExt};
use relaycore::{InvokeError, Message, NodeSpec};
use relaywire::{Invoker, SocketConfig, SocketInvoker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{Duration, Instant};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Spawns a mock node process: for every request frame it replies with the
/// request's message plus a `remote: true` marker, after an optional
/// service delay. Returns the port and a counter of accepted connections.
async fn spawn_node_server(service_delay: Duration) -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let connections_clone = connections.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            connections_clone.fetch_add(1, Ordering::SeqCst);

            tokio::spawn(async move {
                let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
                while let Some(Ok(frame)) = framed.next().await {
                    let request: serde_json::Value = match serde_json::from_slice(&frame) {
                        Ok(v) => v,
                        Err(_) => return,
                    };
                    tokio::time::sleep(service_delay).await;

                    let mut reply = request
                        .get("msg")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null);
                    if let Some(obj) = reply.as_object_mut() {
                        obj.insert("remote".to_string(), serde_json::json!(true));
                    }
                    let payload = serde_json::to_vec(&reply).unwrap();
                    if framed.send(payload.into()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    (port, connections)
}

/// Spawns a server that answers every request with a fixed raw frame.
async fn spawn_raw_server(reply: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
                while let Some(Ok(_)) = framed.next().await {
                    if framed.send(reply.to_vec().into()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    port
}

fn local_node(port: u16) -> (SocketInvoker, NodeSpec) {
    let invoker = SocketInvoker::new(SocketConfig {
        port,
        timeout: Duration::from_secs(5),
    });
    let node = NodeSpec::new("n1", "kelvin").with_config("host", "127.0.0.1");
    (invoker, node)
}

fn message(raw: serde_json::Value) -> Message {
    Message::from_value(raw).unwrap()
}

#[tokio::test]
async fn test_invoke_round_trip() {
    let (port, _) = spawn_node_server(Duration::ZERO).await;
    let (invoker, node) = local_node(port);

    let reply = invoker
        .invoke(&node, message(serde_json::json!({"temp": 21.5})))
        .await
        .unwrap();

    assert_eq!(reply.get_f64("temp"), Some(21.5));
    assert_eq!(reply.get_bool("remote"), Some(true));
}

#[tokio::test]
async fn test_connection_is_reused_across_calls() {
    let (port, connections) = spawn_node_server(Duration::ZERO).await;
    let (invoker, node) = local_node(port);

    for _ in 0..3 {
        invoker
            .invoke(&node, message(serde_json::json!({"seq": 1})))
            .await
            .unwrap();
    }

    assert_eq!(
        connections.load(Ordering::SeqCst),
        1,
        "one persistent connection per target"
    );
}

#[tokio::test]
async fn test_connection_refused_is_transport_unavailable() {
    // Bind and drop to get a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (invoker, node) = local_node(port);
    let err = invoker.invoke(&node, Message::new()).await.unwrap_err();

    match err {
        InvokeError::TransportUnavailable { target, .. } => {
            assert_eq!(target, format!("tcp://127.0.0.1:{}", port));
        }
        other => panic!("expected TransportUnavailable, got: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_reply_is_invalid_response() {
    let port = spawn_raw_server(b"not json at all").await;
    let (invoker, node) = local_node(port);

    let err = invoker.invoke(&node, Message::new()).await.unwrap_err();
    assert!(matches!(err, InvokeError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_scalar_reply_is_invalid_response() {
    let port = spawn_raw_server(b"42").await;
    let (invoker, node) = local_node(port);

    let err = invoker.invoke(&node, Message::new()).await.unwrap_err();
    match err {
        InvokeError::InvalidResponse { target, reason } => {
            assert_eq!(target, format!("tcp://127.0.0.1:{}", port));
            assert!(reason.contains("not a JSON object"));
        }
        other => panic!("expected InvalidResponse, got: {other}"),
    }
}

#[tokio::test]
async fn test_concurrent_calls_to_one_target_are_serialized() {
    let delay = Duration::from_millis(50);
    let (port, connections) = spawn_node_server(delay).await;
    let (invoker, node) = local_node(port);
    let invoker = Arc::new(invoker);

    let started = Instant::now();
    let (a, b) = tokio::join!(
        invoker.invoke(&node, message(serde_json::json!({"call": 1}))),
        invoker.invoke(&node, message(serde_json::json!({"call": 2}))),
    );
    let elapsed = started.elapsed();

    a.unwrap();
    b.unwrap();
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    assert!(
        elapsed >= delay * 2,
        "second call must wait for the first reply, took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_distinct_targets_do_not_block_each_other() {
    let delay = Duration::from_millis(100);
    let (port, connections) = spawn_node_server(delay).await;

    // Two host spellings of the same server give two pool targets.
    let invoker = SocketInvoker::new(SocketConfig {
        port,
        timeout: Duration::from_secs(5),
    });
    let node_a = NodeSpec::new("a", "kelvin").with_config("host", "127.0.0.1");
    let node_b = NodeSpec::new("b", "average").with_config("host", "localhost");

    let started = Instant::now();
    let (a, b) = tokio::join!(
        invoker.invoke(&node_a, message(serde_json::json!({"call": 1}))),
        invoker.invoke(&node_b, message(serde_json::json!({"call": 2}))),
    );
    let elapsed = started.elapsed();

    a.unwrap();
    b.unwrap();
    assert_eq!(connections.load(Ordering::SeqCst), 2, "one connection per target");
    assert!(
        elapsed < delay * 2,
        "unrelated targets proceed in parallel, took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_silent_remote_times_out() {
    // Accepts and reads but never replies.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
                while let Some(Ok(_)) = framed.next().await {}
            });
        }
    });

    let invoker = SocketInvoker::new(SocketConfig {
        port,
        timeout: Duration::from_millis(100),
    });
    let node = NodeSpec::new("n1", "kelvin").with_config("host", "127.0.0.1");

    let err = invoker.invoke(&node, Message::new()).await.unwrap_err();
    assert!(matches!(err, InvokeError::Timeout { .. }));
}
