//! Live Redis tests
//!
//! Ignored by default; they need a Redis server on 127.0.0.1:6379.
//!
//! Run: `cargo test --package redis-kv --test redis_integration -- --ignored`

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::disallowed_methods)]

use redis_kv::{
    AdapterConfig, AdapterOptions, ClientStatus, ConnectionState, RedisClientOptions,
    RedisKvAdapter, RedisStoreClient, StoreClient,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Unique prefix per test so runs never collide
fn test_prefix(name: &str) -> String {
    format!("test:redis_kv:{}:{}:", name, uuid::Uuid::new_v4())
}

fn adapter(name: &str) -> RedisKvAdapter {
    RedisKvAdapter::from_options(AdapterOptions {
        url: Some(REDIS_URL.to_string()),
        key_prefix: Some(test_prefix(name)),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_set_get_mget() {
    let adapter = adapter("mget");

    adapter.set("a", &json!(1), None).await.unwrap();
    adapter.set("b", &json!(2), None).await.unwrap();
    assert_eq!(
        adapter.mget(&["a", "b", "c"]).await.unwrap(),
        vec![Some(json!(1)), Some(json!(2)), None]
    );

    adapter.clear().await.unwrap();
    adapter.destroy().await;
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_ttl_expiry() {
    let adapter = adapter("ttl");

    adapter
        .set("x", &json!("v"), Some(Duration::from_millis(1000)))
        .await
        .unwrap();
    assert_eq!(adapter.get("x").await.unwrap(), Some(json!("v")));

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(adapter.get("x").await.unwrap(), None);

    adapter.destroy().await;
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_batches_and_clear() {
    let adapter = adapter("batch");

    let entries: Vec<(String, serde_json::Value)> =
        (0..150).map(|i| (format!("k{}", i), json!(i))).collect();
    adapter
        .mset(&entries, Some(Duration::from_secs(60)))
        .await
        .unwrap();

    let keys: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();
    assert!(adapter.delete_many(&keys).await.unwrap());
    assert!(!adapter.delete_many(&keys).await.unwrap());

    adapter.mset(&entries[..10], None).await.unwrap();
    adapter.clear().await.unwrap();
    assert!(!adapter.exists("k0").await.unwrap());

    adapter.destroy().await;
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_statistics_and_health() {
    let adapter = adapter("stats");
    adapter.connect().await.unwrap();

    assert!(adapter.is_healthy().await);
    let stats = adapter.get_statistics().await;
    assert!(stats.memory.unwrap().used_memory.unwrap() > 0);
    assert_eq!(stats.connection.port, 6379);
    assert_eq!(stats.connection.status, ClientStatus::Ready);

    adapter.destroy().await;
    assert_eq!(adapter.state(), ConnectionState::Destroyed);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_supplied_client_survives_destroy() {
    let client =
        Arc::new(RedisStoreClient::from_url(REDIS_URL, RedisClientOptions::default()).unwrap());
    client.connect().await.unwrap();

    let adapter = RedisKvAdapter::with_client(
        client.clone(),
        AdapterConfig::merge(AdapterOptions {
            key_prefix: Some(test_prefix("supplied")),
            ..Default::default()
        }),
    );
    adapter.set("k", &json!(1), None).await.unwrap();
    adapter.clear().await.unwrap();
    adapter.destroy().await;

    assert_eq!(client.status(), ClientStatus::Ready);
    assert_eq!(client.ping().await.unwrap(), "PONG");
    client.quit().await.unwrap();
}
