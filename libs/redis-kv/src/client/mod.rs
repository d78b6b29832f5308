//! Store client abstraction
//!
//! The adapter never talks to a wire protocol directly. It drives a
//! [`StoreClient`], which owns the transport, reports its status and
//! publishes lifecycle events.
//!
//! Implementations:
//! - `RedisStoreClient`: production Redis backend (feature `redis-backend`)
//! - `MemoryStoreClient`: in-process backend for tests (feature `memory-backend`)

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

#[cfg(feature = "redis-backend")]
mod redis_client;

#[cfg(feature = "memory-backend")]
mod memory_client;

#[cfg(feature = "redis-backend")]
pub use redis_client::{RedisClientOptions, RedisStoreClient};

#[cfg(feature = "memory-backend")]
pub use memory_client::MemoryStoreClient;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Capacity of each client's event channel
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Observable status of a store client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    /// Created but never dialed
    Wait,
    Connecting,
    /// Transport established, handshake pending
    Connect,
    Ready,
    Reconnecting,
    End,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientStatus::Wait => "wait",
            ClientStatus::Connecting => "connecting",
            ClientStatus::Connect => "connect",
            ClientStatus::Ready => "ready",
            ClientStatus::Reconnecting => "reconnecting",
            ClientStatus::End => "end",
        };
        f.write_str(s)
    }
}

/// Lifecycle notification published by a store client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Connect,
    Ready,
    Error(String),
    Reconnecting,
    End,
}

/// Where a client is connected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Native store client driven by the adapter
///
/// Keys passed here are already namespaced; implementations must not
/// apply any prefix of their own.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    // ========== Lifecycle ==========

    /// Current transport status
    fn status(&self) -> ClientStatus;

    /// Subscribe to lifecycle events published after this call
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;

    fn endpoint(&self) -> Endpoint;

    /// Dial the store; resolves once the transport is up
    async fn connect(&self) -> StoreResult<()>;

    /// Graceful close (QUIT)
    async fn quit(&self) -> StoreResult<()>;

    /// Forced close, no handshake
    async fn disconnect(&self) -> StoreResult<()>;

    // ========== Commands ==========

    async fn ping(&self) -> StoreResult<String>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// SET with expiration in seconds
    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> StoreResult<()>;

    /// Delete keys, returning how many actually existed
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Multi-get; the result has one slot per requested key, in order
    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>>;

    async fn mset(&self, entries: &[(String, String)]) -> StoreResult<()>;

    // ========== Pipelines ==========

    /// One round trip carrying a `SET key value EX seconds` per entry
    async fn pipeline_set_ex(&self, entries: &[(String, String, u64)]) -> StoreResult<()>;

    /// One round trip carrying a `DEL` per chunk; returns per-chunk counts
    async fn pipeline_del(&self, chunks: &[Vec<String>]) -> StoreResult<Vec<u64>>;

    // ========== Keyspace / Server ==========

    /// One SCAN step. A returned cursor of 0 ends the iteration.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
        -> StoreResult<(u64, Vec<String>)>;

    /// Delete every key in the selected database
    async fn flushdb(&self) -> StoreResult<()>;

    /// Raw `INFO <section>` text
    async fn info(&self, section: &str) -> StoreResult<String>;
}

/// Escape glob metacharacters so `literal` matches itself in a SCAN MATCH pattern
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
