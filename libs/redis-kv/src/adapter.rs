//! Redis key-value adapter
//!
//! Binds the generic key-value operations to a [`StoreClient`]. Keys are
//! namespaced with the configured prefix, values go through the codec, and
//! every store call runs through [`execute`].

use crate::client::{escape_glob, StoreClient};
use crate::codec::Codec;
use crate::config::AdapterConfig;
use crate::connection::{
    ClientHandle, ConnectionManager, ConnectionState, READY_POLL_ATTEMPTS, READY_POLL_INTERVAL,
};
use crate::error::{AdapterError, Result, StoreError};
use crate::executor::execute;
use crate::observer::{AdapterEvent, AdapterObserver, TracingObserver};
use crate::stats::{ConnectionInfo, OperationKind, StatisticsCounters};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Keys requested per SCAN step during a prefixed `clear()`
pub const SCAN_BATCH_SIZE: usize = 100;

pub struct RedisKvAdapter {
    pub(crate) config: AdapterConfig,
    pub(crate) connection: ConnectionManager,
    pub(crate) codec: Arc<dyn Codec>,
}

impl std::fmt::Debug for RedisKvAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvAdapter")
            .field("key_prefix", &self.config.key_prefix)
            .field("connection", &self.connection)
            .finish()
    }
}

impl RedisKvAdapter {
    /// Adapter with its own lazily connected Redis client
    #[cfg(feature = "redis-backend")]
    pub fn new(config: AdapterConfig) -> Result<Self> {
        config.validate()?;
        let client = crate::client::RedisStoreClient::from_config(&config)
            .map_err(|e| AdapterError::Config(format!("invalid connection target: {}", e)))?;
        Ok(Self::build(ClientHandle::Owned(Arc::new(client)), config))
    }

    /// [`RedisKvAdapter::new`] after applying defaults to `options`
    #[cfg(feature = "redis-backend")]
    pub fn from_options(options: crate::config::AdapterOptions) -> Result<Self> {
        Self::new(AdapterConfig::merge(options))
    }

    /// Adapter over a caller-supplied client
    ///
    /// The client's current status is adopted as-is and it is never closed
    /// by the adapter, not even on `destroy()`.
    pub fn with_client(client: Arc<dyn StoreClient>, config: AdapterConfig) -> Self {
        Self::build(ClientHandle::Borrowed(client), config)
    }

    /// Adapter that takes ownership of `client` and closes it on teardown
    pub fn with_owned_client(client: Arc<dyn StoreClient>, config: AdapterConfig) -> Self {
        Self::build(ClientHandle::Owned(client), config)
    }

    fn build(handle: ClientHandle, config: AdapterConfig) -> Self {
        let connection =
            ConnectionManager::new(handle, Arc::new(TracingObserver), config.connection_timeout);
        let codec = config.serialization.codec();
        Self {
            config,
            connection,
            codec,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AdapterObserver>) -> Self {
        self.connection.set_observer(observer);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &Arc<dyn StoreClient> {
        self.connection.client()
    }

    pub(crate) fn stats(&self) -> &StatisticsCounters {
        self.connection.stats()
    }

    pub(crate) fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    pub(crate) fn encode(&self, operation: &'static str, value: &Value) -> Result<String> {
        self.codec
            .encode(value)
            .map_err(|e| AdapterError::Serialization {
                operation,
                message: e.to_string(),
            })
    }

    pub(crate) fn decode(&self, operation: &'static str, raw: &str) -> Result<Value> {
        self.codec
            .decode(raw)
            .map_err(|e| AdapterError::Serialization {
                operation,
                message: e.to_string(),
            })
    }

    // ========== Lifecycle ==========

    /// Connect now instead of on first use
    pub async fn connect(&self) -> Result<()> {
        self.connection.ensure_ready().await
    }

    /// Wait for readiness for up to `timeout`, rounded up to whole polling
    /// intervals; starts connecting when needed
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let interval = READY_POLL_INTERVAL.as_millis();
        let attempts = timeout.as_millis().div_ceil(interval).max(1);
        let attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
        self.connection
            .ready_within(attempts)
            .await
            .map_err(|e| e.during("wait_until_ready"))
    }

    /// Close an owned transport; the adapter reconnects on next use
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    /// Reject all further operations and close an owned client. Idempotent.
    pub async fn destroy(&self) {
        self.connection.destroy().await;
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.pump_events();
        self.connection.state()
    }

    pub fn get_connection_info(&self) -> ConnectionInfo {
        let client = self.client();
        let endpoint = client.endpoint();
        ConnectionInfo {
            host: endpoint.host,
            port: endpoint.port,
            db: endpoint.db,
            status: client.status(),
        }
    }

    /// Default polling budget of `ensure_ready`
    pub fn ready_timeout() -> Duration {
        READY_POLL_INTERVAL * READY_POLL_ATTEMPTS
    }

    // ========== Key-Value Operations ==========

    /// Value for `key`, or None when absent or expired
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.stats().record_operation(OperationKind::Get);
        let key = self.key(key);
        let raw = execute(&self.connection, "get", self.client().get(&key)).await?;
        raw.map(|raw| self.decode("get", &raw)).transpose()
    }

    /// Store `value`; `ttl` falls back to the configured default, zero means
    /// no expiration
    pub async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        self.stats().record_operation(OperationKind::Set);
        let key = self.key(key);
        let raw = self.encode("set", value)?;
        let ttl = self.config.effective_ttl(ttl);

        if ttl.is_zero() {
            execute(&self.connection, "set", self.client().set(&key, &raw)).await
        } else {
            let seconds = ttl_seconds(ttl);
            execute(
                &self.connection,
                "set",
                self.client().set_ex(&key, &raw, seconds),
            )
            .await
        }
    }

    /// True only when a key was actually removed
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.stats().record_operation(OperationKind::Delete);
        let keys = [self.key(key)];
        let removed = execute(&self.connection, "delete", self.client().del(&keys)).await?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let key = self.key(key);
        execute(&self.connection, "exists", self.client().exists(&key)).await
    }

    /// Remove this adapter's keys
    ///
    /// With a key prefix, keys are enumerated with SCAN and deleted page by
    /// page; keys outside the prefix are never touched. Without a prefix the
    /// whole database is flushed, including other tenants' data.
    pub async fn clear(&self) -> Result<()> {
        if self.config.key_prefix.is_empty() {
            execute(&self.connection, "clear", self.client().flushdb()).await?;
            self.connection.observer().on_event(&AdapterEvent::FullFlush {
                db: self.client().endpoint().db,
            });
            return Ok(());
        }

        let client = self.client();
        let pattern = format!("{}*", escape_glob(&self.config.key_prefix));
        let scan_and_delete = async {
            let mut cursor = 0;
            let mut removed = 0;
            loop {
                let (next, keys) = client.scan(cursor, &pattern, SCAN_BATCH_SIZE).await?;
                if !keys.is_empty() {
                    removed += client.del(&keys).await?;
                }
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            Ok::<u64, StoreError>(removed)
        };

        let removed = execute(&self.connection, "clear", scan_and_delete).await?;
        debug!(
            "RedisKvAdapter cleared {} keys under prefix '{}'",
            removed, self.config.key_prefix
        );
        Ok(())
    }

    /// Liveness token from the store, verbatim
    pub async fn ping(&self) -> Result<String> {
        execute(&self.connection, "ping", self.client().ping()).await
    }

    // ========== Typed Helpers ==========

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| AdapterError::Serialization {
                    operation: "get",
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub async fn set_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| AdapterError::Serialization {
            operation: "set",
            message: e.to_string(),
        })?;
        self.set(key, &value, ttl).await
    }
}

/// Whole seconds for SET EX, rounding any remainder up
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0))
}
