//! Generic key-value facade

use crate::adapter::RedisKvAdapter;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Key-value operations consumed by higher layers
///
/// `ttl: None` uses the store's default TTL; `Some(Duration::ZERO)` means
/// no expiration.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// True only when the key existed
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    /// Result has exactly one slot per key, in order
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Value>>>;

    async fn mset(&self, entries: &[(String, Value)], ttl: Option<Duration>) -> Result<()>;

    async fn delete_many(&self, keys: &[String]) -> Result<bool>;

    /// Never fails; any probe error reads as unhealthy
    async fn is_healthy(&self) -> bool;
}

#[async_trait]
impl KvStore for RedisKvAdapter {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        RedisKvAdapter::get(self, key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        RedisKvAdapter::set(self, key, &value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        RedisKvAdapter::delete(self, key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        RedisKvAdapter::exists(self, key).await
    }

    async fn clear(&self) -> Result<()> {
        RedisKvAdapter::clear(self).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Value>>> {
        RedisKvAdapter::mget(self, keys).await
    }

    async fn mset(&self, entries: &[(String, Value)], ttl: Option<Duration>) -> Result<()> {
        RedisKvAdapter::mset(self, entries, ttl).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<bool> {
        RedisKvAdapter::delete_many(self, keys).await
    }

    async fn is_healthy(&self) -> bool {
        RedisKvAdapter::is_healthy(self).await
    }
}
