//! Redis store client
//!
//! Wraps a multiplexed `redis::aio::ConnectionManager`. The client is lazy:
//! nothing is dialed until `connect()`. Commands are bounded by the command
//! timeout and retried on transport errors up to the configured budget; the
//! connection manager re-dials underneath on the next use.

use super::{ClientStatus, Endpoint, StoreClient, StoreEvent, StoreResult, EVENT_CHANNEL_CAPACITY};
use crate::config::{AdapterConfig, ConnectionTarget};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use redis::aio::ConnectionManager as MultiplexedConnection;
use redis::{
    Client, Cmd, ConnectionAddr, ConnectionInfo, FromRedisValue, IntoConnectionInfo, Pipeline,
    RedisConnectionInfo, RedisError, RedisResult,
};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Base delay between command retries, multiplied by the attempt number
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Transport options applied by [`RedisStoreClient`]
#[derive(Debug, Clone)]
pub struct RedisClientOptions {
    /// Bound on dialing the initial connection
    pub connection_timeout: Duration,
    /// Bound on each command / pipeline round trip
    pub command_timeout: Duration,
    /// Extra attempts for a command that hit a transport error
    pub max_retries_per_request: u32,
    /// PING after dialing before reporting ready
    pub enable_ready_check: bool,
}

impl Default for RedisClientOptions {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            max_retries_per_request: 3,
            enable_ready_check: true,
        }
    }
}

impl From<&AdapterConfig> for RedisClientOptions {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            connection_timeout: config.connection_timeout,
            command_timeout: config.command_timeout,
            max_retries_per_request: config.max_retries_per_request,
            enable_ready_check: config.enable_ready_check,
        }
    }
}

/// Lazy Redis client implementing [`StoreClient`]
pub struct RedisStoreClient {
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    status: RwLock<ClientStatus>,
    events: broadcast::Sender<StoreEvent>,
    endpoint: Endpoint,
    options: RedisClientOptions,
}

impl std::fmt::Debug for RedisStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStoreClient")
            .field("endpoint", &self.endpoint)
            .field("status", &self.status())
            .field("conn", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStoreClient {
    /// Create a client for explicit connection parameters (does not dial)
    pub fn open(info: ConnectionInfo, options: RedisClientOptions) -> StoreResult<Self> {
        let endpoint = endpoint_of(&info);
        let client = Client::open(info)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            connection: Mutex::new(None),
            status: RwLock::new(ClientStatus::Wait),
            events,
            endpoint,
            options,
        })
    }

    /// Create a client from a `redis://` / `rediss://` URL (does not dial)
    pub fn from_url(url: &str, options: RedisClientOptions) -> StoreResult<Self> {
        Self::open(url.into_connection_info()?, options)
    }

    /// Create a client for the adapter configuration's effective target
    ///
    /// Explicit username/password override URL credentials; a non-zero
    /// `db` overrides the URL's database.
    pub fn from_config(config: &AdapterConfig) -> StoreResult<Self> {
        let mut info = match config.target() {
            ConnectionTarget::Url(url) => url.as_str().into_connection_info()?,
            ConnectionTarget::HostPort { host, port } => ConnectionInfo {
                addr: ConnectionAddr::Tcp(host, port),
                redis: RedisConnectionInfo::default(),
            },
        };

        if config.db != 0 {
            info.redis.db = config.db;
        }
        if config.username.is_some() {
            info.redis.username = config.username.clone();
        }
        if config.password.is_some() {
            info.redis.password = config.password.clone();
        }

        Self::open(info, RedisClientOptions::from(config))
    }

    fn set_status(&self, status: ClientStatus) {
        *self.status.write() = status;
    }

    fn publish(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn connection(&self) -> StoreResult<MultiplexedConnection> {
        self.connection
            .lock()
            .clone()
            .ok_or_else(|| StoreError::NotConnected(self.status()))
    }

    fn connect_failed(&self, message: String) {
        self.set_status(ClientStatus::End);
        self.publish(StoreEvent::Error(message));
        self.publish(StoreEvent::End);
    }

    /// Decide whether a failed command gets another attempt
    ///
    /// Transport errors publish Error, then Reconnecting while budget
    /// remains. Once the budget is spent the connection is treated as lost:
    /// it is dropped and the client ends, so an owning adapter re-dials.
    fn should_retry(&self, err: &RedisError, attempt: u32) -> bool {
        let transient =
            err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal();
        if !transient {
            return false;
        }

        self.publish(StoreEvent::Error(err.to_string()));
        if attempt >= self.options.max_retries_per_request {
            warn!(
                "Redis transport error on {} after {} attempts, giving up: {}",
                self.endpoint,
                attempt + 1,
                err
            );
            drop(self.connection.lock().take());
            self.set_status(ClientStatus::End);
            self.publish(StoreEvent::End);
            return false;
        }

        debug!(
            "Redis transport error on {} (attempt {}): {}",
            self.endpoint,
            attempt + 1,
            err
        );
        self.set_status(ClientStatus::Reconnecting);
        self.publish(StoreEvent::Reconnecting);
        true
    }

    fn mark_recovered(&self) {
        let recovered = {
            let mut status = self.status.write();
            let was_reconnecting = *status == ClientStatus::Reconnecting;
            if was_reconnecting {
                *status = ClientStatus::Ready;
            }
            was_reconnecting
        };
        if recovered {
            self.publish(StoreEvent::Ready);
        }
    }

    /// Run `attempt` under the command timeout, retrying transport errors
    async fn with_retry<T, F, Fut>(&self, mut attempt: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut retries = 0;
        loop {
            match tokio::time::timeout(self.options.command_timeout, attempt()).await {
                Ok(Ok(value)) => {
                    self.mark_recovered();
                    return Ok(value);
                },
                Ok(Err(StoreError::Redis(e))) => {
                    if !self.should_retry(&e, retries) {
                        return Err(StoreError::Redis(e));
                    }
                    retries += 1;
                    tokio::time::sleep(RETRY_BACKOFF * retries).await;
                },
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(StoreError::Timeout(self.options.command_timeout)),
            }
        }
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> StoreResult<T> {
        self.with_retry(move || async move {
            let mut conn = self.connection()?;
            let value: T = cmd.query_async(&mut conn).await?;
            Ok::<T, StoreError>(value)
        })
        .await
    }

    async fn query_pipeline<T: FromRedisValue>(&self, pipe: &Pipeline) -> StoreResult<T> {
        self.with_retry(move || async move {
            let mut conn = self.connection()?;
            let value: T = pipe.query_async(&mut conn).await?;
            Ok::<T, StoreError>(value)
        })
        .await
    }
}

/// Ends the client if a `connect` call is dropped before it settles
struct PendingConnect<'a> {
    client: &'a RedisStoreClient,
    settled: bool,
}

impl PendingConnect<'_> {
    fn settle(mut self) {
        self.settled = true;
    }

    fn fail(mut self, message: String) {
        self.settled = true;
        self.client.connect_failed(message);
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.client
                .connect_failed(format!("connect to {} abandoned", self.client.endpoint));
        }
    }
}

async fn ready_check(mut conn: MultiplexedConnection) -> RedisResult<()> {
    let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}

fn endpoint_of(info: &ConnectionInfo) -> Endpoint {
    let (host, port) = match &info.addr {
        ConnectionAddr::Tcp(host, port) => (host.clone(), *port),
        ConnectionAddr::TcpTls { host, port, .. } => (host.clone(), *port),
        other => (other.to_string(), 0),
    };
    Endpoint {
        host,
        port,
        db: info.redis.db,
    }
}

#[async_trait]
impl StoreClient for RedisStoreClient {
    fn status(&self) -> ClientStatus {
        *self.status.read()
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    async fn connect(&self) -> StoreResult<()> {
        if self.status() == ClientStatus::Ready && self.connection.lock().is_some() {
            return Ok(());
        }

        // Dial and ready check share one budget
        let budget = self.options.connection_timeout;
        let started = Instant::now();
        self.set_status(ClientStatus::Connecting);
        let pending = PendingConnect {
            client: self,
            settled: false,
        };

        let dial = MultiplexedConnection::new(self.client.clone());
        let conn = match tokio::time::timeout(budget, dial).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                pending.fail(e.to_string());
                return Err(e.into());
            },
            Err(_) => {
                pending.fail(format!(
                    "connect to {} timed out after {:?}",
                    self.endpoint, budget
                ));
                return Err(StoreError::Timeout(budget));
            },
        };

        self.set_status(ClientStatus::Connect);
        self.publish(StoreEvent::Connect);

        if self.options.enable_ready_check {
            let remaining = budget.saturating_sub(started.elapsed());
            match tokio::time::timeout(remaining, ready_check(conn.clone())).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    pending.fail(e.to_string());
                    return Err(e.into());
                },
                Err(_) => {
                    pending.fail(format!(
                        "ready check on {} did not finish within {:?}",
                        self.endpoint, budget
                    ));
                    return Err(StoreError::Timeout(budget));
                },
            }
        }

        pending.settle();
        *self.connection.lock() = Some(conn);
        self.set_status(ClientStatus::Ready);
        self.publish(StoreEvent::Ready);
        Ok(())
    }

    async fn quit(&self) -> StoreResult<()> {
        let conn = self.connection.lock().take();
        let result = match conn {
            Some(mut conn) => {
                let quit = async {
                    let _: () = redis::cmd("QUIT").query_async(&mut conn).await?;
                    Ok::<(), RedisError>(())
                };
                match tokio::time::timeout(self.options.command_timeout, quit).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(_) => Err(StoreError::Timeout(self.options.command_timeout)),
                }
            },
            None => Ok(()),
        };

        if self.status() != ClientStatus::End {
            self.set_status(ClientStatus::End);
            self.publish(StoreEvent::End);
        }
        result
    }

    async fn disconnect(&self) -> StoreResult<()> {
        // Dropping the last handle closes the multiplexed connection
        drop(self.connection.lock().take());
        if self.status() != ClientStatus::End {
            self.set_status(ClientStatus::End);
            self.publish(StoreEvent::End);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<String> {
        self.query(&redis::cmd("PING")).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(&cmd).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        self.query(&cmd).await
    }

    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> StoreResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(seconds);
        self.query(&cmd).await
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.query(&cmd).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: u64 = self.query(&cmd).await?;
        Ok(count > 0)
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("MGET");
        cmd.arg(keys);
        self.query(&cmd).await
    }

    async fn mset(&self, entries: &[(String, String)]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("MSET");
        for (key, value) in entries {
            cmd.arg(key).arg(value);
        }
        self.query(&cmd).await
    }

    async fn pipeline_set_ex(&self, entries: &[(String, String, u64)]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (key, value, seconds) in entries {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(*seconds)
                .ignore();
        }
        self.query_pipeline(&pipe).await
    }

    async fn pipeline_del(&self, chunks: &[Vec<String>]) -> StoreResult<Vec<u64>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for chunk in chunks {
            pipe.cmd("DEL").arg(chunk);
        }
        self.query_pipeline(&pipe).await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count);
        self.query(&cmd).await
    }

    async fn flushdb(&self) -> StoreResult<()> {
        self.query(&redis::cmd("FLUSHDB")).await
    }

    async fn info(&self, section: &str) -> StoreResult<String> {
        let mut cmd = redis::cmd("INFO");
        cmd.arg(section);
        self.query(&cmd).await
    }
}
