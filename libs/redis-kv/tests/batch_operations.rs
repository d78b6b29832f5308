//! Batch operation tests: round trip counts, chunking and ordering

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::disallowed_methods)]

use redis_kv::{AdapterConfig, AdapterOptions, MemoryStoreClient, RedisKvAdapter};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<MemoryStoreClient>, RedisKvAdapter) {
    let client = Arc::new(MemoryStoreClient::connected());
    let adapter = RedisKvAdapter::with_client(
        client.clone(),
        AdapterConfig::merge(AdapterOptions {
            key_prefix: Some("batch:".to_string()),
            ..Default::default()
        }),
    );
    (client, adapter)
}

fn entries(count: usize) -> Vec<(String, Value)> {
    (0..count).map(|i| (format!("k{}", i), json!(i))).collect()
}

#[tokio::test]
async fn test_empty_batches_skip_store() {
    let (client, adapter) = setup();

    assert!(adapter.mget::<&str>(&[]).await.unwrap().is_empty());
    adapter.mset::<&str>(&[], None).await.unwrap();
    assert!(!adapter.delete_many::<&str>(&[]).await.unwrap());

    assert_eq!(client.round_trips(), 0);
    let stats = adapter.get_statistics().await;
    assert_eq!(stats.counters.total_commands, 0);
    assert_eq!(stats.counters.operations.batches, 0);
}

#[tokio::test]
async fn test_mget_preserves_order_and_length() {
    let (client, adapter) = setup();
    adapter.mset(&entries(3), None).await.unwrap();

    let before = client.round_trips();
    let keys = ["k2", "missing", "k0", "k2", "k1"];
    let values = adapter.mget(&keys).await.unwrap();

    assert_eq!(values.len(), keys.len());
    assert_eq!(
        values,
        vec![Some(json!(2)), None, Some(json!(0)), Some(json!(2)), Some(json!(1))]
    );
    assert_eq!(client.round_trips(), before + 1);
}

#[tokio::test]
async fn test_mset_without_ttl_is_single_command() {
    let (client, adapter) = setup();
    adapter.mset(&entries(20), None).await.unwrap();

    assert_eq!(client.commands(), 1);
    assert_eq!(client.pipelines(), 0);
    assert_eq!(client.len(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_mset_with_ttl_is_one_pipeline() {
    let (client, adapter) = setup();
    adapter
        .mset(&entries(20), Some(Duration::from_millis(500)))
        .await
        .unwrap();

    assert_eq!(client.commands(), 0);
    assert_eq!(client.pipelines(), 1);
    assert_eq!(adapter.get("k19").await.unwrap(), Some(json!(19)));

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert!(adapter.mget(&["k0", "k19"]).await.unwrap().iter().all(Option::is_none));
}

#[tokio::test]
async fn test_delete_many_across_chunk_threshold() {
    let (client, adapter) = setup();
    adapter.mset(&entries(150), None).await.unwrap();

    let keys: Vec<String> = (0..150).map(|i| format!("k{}", i)).collect();
    let pipelines_before = client.pipelines();

    assert!(adapter.delete_many(&keys).await.unwrap());
    assert_eq!(client.pipelines(), pipelines_before + 1);
    assert!(client.is_empty());

    // Nothing left to remove
    assert!(!adapter.delete_many(&keys).await.unwrap());
}

#[tokio::test]
async fn test_delete_many_below_threshold_is_single_command() {
    let (client, adapter) = setup();
    adapter.mset(&entries(50), None).await.unwrap();

    let commands_before = client.commands();
    let keys: Vec<String> = (0..50).map(|i| format!("k{}", i)).collect();

    assert!(adapter.delete_many(&keys).await.unwrap());
    assert_eq!(client.commands(), commands_before + 1);
    assert_eq!(client.pipelines(), 0);
}

#[tokio::test]
async fn test_delete_many_partial_match() {
    let (_client, adapter) = setup();
    adapter.set("only", &json!(1), None).await.unwrap();

    assert!(adapter
        .delete_many(&["absent-1", "only", "absent-2"])
        .await
        .unwrap());
    assert!(!adapter.exists("only").await.unwrap());
}

#[tokio::test]
async fn test_batches_counted_once() {
    let (_client, adapter) = setup();
    adapter.mset(&entries(10), None).await.unwrap();
    adapter.mget(&["k1", "k2", "k3"]).await.unwrap();
    adapter.delete_many(&["k1", "k2"]).await.unwrap();

    let stats = adapter.get_statistics().await;
    assert_eq!(stats.counters.operations.batches, 3);
    assert_eq!(stats.counters.total_commands, 3);
    assert_eq!(stats.counters.successful_commands, 3);
}
