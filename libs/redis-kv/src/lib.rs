//! Redis Key-Value Adapter
//!
//! Binds a generic key-value interface to a Redis client, adding connection
//! lifecycle management, pipelined batch operations, TTL translation and
//! health/statistics reporting.
//!
//! # Key Components
//!
//! - **RedisKvAdapter**: the adapter; implements [`KvStore`]
//! - **ConnectionManager**: readiness polling, event-driven state, owned vs supplied clients
//! - **StoreClient**: seam over the native client (`RedisStoreClient`, `MemoryStoreClient`)
//! - **Codec**: value serialization
//! - **AdapterObserver**: lifecycle event sink (defaults to `tracing`)
//!
//! # Example
//!
//! ```no_run
//! use redis_kv::{AdapterConfig, AdapterOptions, RedisKvAdapter};
//! use serde_json::json;
//!
//! # async fn run() -> redis_kv::Result<()> {
//! let adapter = RedisKvAdapter::new(AdapterConfig::merge(AdapterOptions {
//!     key_prefix: Some("app:".to_string()),
//!     ..Default::default()
//! }))?;
//!
//! adapter.set("user:1", &json!({"name": "ada"}), None).await?;
//! let user = adapter.get("user:1").await?;
//! adapter.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod batch;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod health;
pub mod observer;
pub mod stats;
pub mod traits;

// Re-exports
pub use adapter::RedisKvAdapter;
pub use client::{ClientStatus, Endpoint, StoreClient, StoreEvent};
pub use codec::{Codec, CodecError, JsonCodec, PlainCodec, Serialization};
pub use config::{AdapterConfig, AdapterOptions, ConnectionTarget};
pub use connection::ConnectionState;
pub use error::{AdapterError, Result, StoreError};
pub use observer::{AdapterEvent, AdapterObserver, TracingObserver};
pub use stats::{AdapterStatistics, ConnectionInfo, CounterSnapshot, HealthSnapshot, MemoryUsage};
pub use traits::KvStore;

#[cfg(feature = "redis-backend")]
pub use client::{RedisClientOptions, RedisStoreClient};

#[cfg(feature = "memory-backend")]
pub use client::MemoryStoreClient;
