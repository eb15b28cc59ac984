//! Redis backend contract tests.
//!
//! Integration tests require Redis running on localhost:6379.
//! Run with: cargo test --features redis -- --ignored

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use namedbus::backend::RedisBackend;
use namedbus::{BusOptions, Payload, PingOptions, Registry};

#[tokio::test]
#[ignore]
async fn test_redis_delivers_across_instances() {
    let left = Registry::new(Arc::new(RedisBackend::default()));
    let right = Registry::new(Arc::new(RedisBackend::default()));

    let sender = left
        .get_or_create("redis_contract_greet", BusOptions::default())
        .await
        .expect("Failed to connect to Redis");
    let receiver = right
        .get_or_create("redis_contract_greet", BusOptions::default())
        .await
        .expect("Failed to connect to Redis");

    let (capture, mut received) = mpsc::unbounded_channel();
    receiver
        .on("greet", move |payload: Payload| {
            let capture = capture.clone();
            async move {
                let _ = capture.send(payload);
            }
        })
        .await
        .expect("Failed to subscribe");

    sender.emit("greet", "Hi").await.expect("Failed to publish");

    let payload = timeout(Duration::from_secs(5), received.recv())
        .await
        .expect("Timed out waiting for delivery")
        .expect("Capture channel closed");
    assert_eq!(payload.as_str(), Some("Hi"));

    sender.destroy().await;
    receiver.destroy().await;
}

#[tokio::test]
#[ignore]
async fn test_redis_ping_counts_peers() {
    let left = Registry::new(Arc::new(RedisBackend::default()));
    let right = Registry::new(Arc::new(RedisBackend::default()));

    let prober = left
        .get_or_create("redis_contract_ping", BusOptions::default())
        .await
        .expect("Failed to connect to Redis");
    let peer = right
        .get_or_create("redis_contract_ping", BusOptions::default())
        .await
        .expect("Failed to connect to Redis");

    let alive = prober
        .ping_with(PingOptions::new(Duration::from_secs(5), 1))
        .await
        .expect("Probe failed");
    assert!(alive);

    prober.destroy().await;
    peer.destroy().await;
}
