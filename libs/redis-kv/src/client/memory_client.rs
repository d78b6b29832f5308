//! In-memory store client
//!
//! Uses DashMap for concurrent access. Expiry is measured on the tokio clock,
//! so tests running with a paused runtime can fast-forward TTLs.
//! Counters and fault switches let tests observe round trips and inject
//! failures without a Redis server.

use super::{ClientStatus, Endpoint, StoreClient, StoreEvent, StoreResult, EVENT_CHANNEL_CAPACITY};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
    /// Insertion order, doubles as the SCAN cursor
    seq: u64,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory [`StoreClient`] with test instrumentation
pub struct MemoryStoreClient {
    entries: DashMap<String, StoredValue>,
    next_seq: AtomicU64,
    status: RwLock<ClientStatus>,
    events: broadcast::Sender<StoreEvent>,
    stalled_handshake: bool,

    latency: RwLock<Duration>,
    connect_delay: RwLock<Duration>,
    command_failure: RwLock<Option<String>>,
    connect_failure: AtomicBool,
    info_failure: AtomicBool,
    quit_failure: AtomicBool,

    commands: AtomicU64,
    pipelines: AtomicU64,
    connects: AtomicU64,
    quits: AtomicU64,
    disconnects: AtomicU64,
}

impl MemoryStoreClient {
    /// Lazy client: status `Wait` until `connect` is called
    pub fn new() -> Self {
        Self::build(ClientStatus::Wait, false)
    }

    /// Client that is already ready, like a handle the caller connected earlier
    pub fn connected() -> Self {
        Self::build(ClientStatus::Ready, false)
    }

    /// Client whose handshake never completes: `connect` reaches `Connect`
    /// but `Ready` is never emitted
    pub fn with_stalled_handshake() -> Self {
        Self::build(ClientStatus::Wait, true)
    }

    fn build(status: ClientStatus, stalled_handshake: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
            status: RwLock::new(status),
            events,
            stalled_handshake,
            latency: RwLock::new(Duration::ZERO),
            connect_delay: RwLock::new(Duration::ZERO),
            command_failure: RwLock::new(None),
            connect_failure: AtomicBool::new(false),
            info_failure: AtomicBool::new(false),
            quit_failure: AtomicBool::new(false),
            commands: AtomicU64::new(0),
            pipelines: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            quits: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
        }
    }

    // ==================== Test Support ====================

    /// Fail every subsequent command with `message` (None restores success)
    pub fn fail_commands(&self, message: Option<&str>) {
        *self.command_failure.write() = message.map(str::to_string);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.connect_failure.store(fail, Ordering::Relaxed);
    }

    pub fn fail_info(&self, fail: bool) {
        self.info_failure.store(fail, Ordering::Relaxed);
    }

    pub fn fail_quit(&self, fail: bool) {
        self.quit_failure.store(fail, Ordering::Relaxed);
    }

    /// Delay applied to every round trip
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Time `connect` spends in `Connecting` before it succeeds or fails
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.write() = delay;
    }

    /// Publish an event as if the transport produced it
    pub fn emit(&self, event: StoreEvent) {
        match event {
            StoreEvent::Connect => self.set_status(ClientStatus::Connect),
            StoreEvent::Ready => self.set_status(ClientStatus::Ready),
            StoreEvent::Reconnecting => self.set_status(ClientStatus::Reconnecting),
            StoreEvent::End => self.set_status(ClientStatus::End),
            StoreEvent::Error(_) => {},
        }
        let _ = self.events.send(event);
    }

    /// Single-command round trips served so far
    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    /// Pipeline round trips served so far
    pub fn pipelines(&self) -> u64 {
        self.pipelines.load(Ordering::Relaxed)
    }

    pub fn round_trips(&self) -> u64 {
        self.commands() + self.pipelines()
    }

    /// Dials attempted so far
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn quit_count(&self) -> u64 {
        self.quits.load(Ordering::Relaxed)
    }

    pub fn disconnect_count(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Raw (already namespaced) key lookup that bypasses status and counters
    pub fn contains_key(&self, key: &str) -> bool {
        self.live_value(key).is_some()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ==================== Internals ====================

    fn set_status(&self, status: ClientStatus) {
        *self.status.write() = status;
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    async fn round_trip(&self, pipeline: bool) -> StoreResult<()> {
        let status = self.status();
        if status != ClientStatus::Ready {
            return Err(StoreError::NotConnected(status));
        }

        if pipeline {
            self.pipelines.fetch_add(1, Ordering::Relaxed);
        } else {
            self.commands.fetch_add(1, Ordering::Relaxed);
        }

        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.command_failure.read().clone() {
            Some(message) => Err(StoreError::Backend(message)),
            None => Ok(()),
        }
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        None
    }

    fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) {
        // A TTL past the clock's range never expires
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                stored.value = value.to_string();
                stored.expires_at = expires_at;
            },
            Entry::Vacant(vacant) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
                vacant.insert(StoredValue {
                    value: value.to_string(),
                    expires_at,
                    seq,
                });
            },
        }
    }

    fn remove_live(&self, key: &str, now: Instant) -> bool {
        self.entries
            .remove(key)
            .is_some_and(|(_, stored)| stored.is_live(now))
    }

    fn used_memory(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| (e.key().len() + e.value().value.len()) as u64)
            .sum()
    }
}

impl Default for MemoryStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStoreClient")
            .field("status", &self.status())
            .field("keys", &self.entries.len())
            .finish()
    }
}

#[async_trait]
impl StoreClient for MemoryStoreClient {
    fn status(&self) -> ClientStatus {
        *self.status.read()
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: "memory".to_string(),
            port: 0,
            db: 0,
        }
    }

    async fn connect(&self) -> StoreResult<()> {
        if self.status() == ClientStatus::Ready {
            return Ok(());
        }

        self.connects.fetch_add(1, Ordering::Relaxed);
        self.set_status(ClientStatus::Connecting);
        let delay = *self.connect_delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.connect_failure.load(Ordering::Relaxed) {
            self.set_status(ClientStatus::End);
            self.publish(StoreEvent::Error("connection refused".to_string()));
            self.publish(StoreEvent::End);
            return Err(StoreError::Backend("connection refused".to_string()));
        }

        self.set_status(ClientStatus::Connect);
        self.publish(StoreEvent::Connect);
        if self.stalled_handshake {
            return Ok(());
        }

        self.set_status(ClientStatus::Ready);
        self.publish(StoreEvent::Ready);
        Ok(())
    }

    async fn quit(&self) -> StoreResult<()> {
        self.quits.fetch_add(1, Ordering::Relaxed);
        if self.quit_failure.load(Ordering::Relaxed) {
            return Err(StoreError::Backend("QUIT failed".to_string()));
        }
        if self.status() != ClientStatus::End {
            self.set_status(ClientStatus::End);
            self.publish(StoreEvent::End);
        }
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        if self.status() != ClientStatus::End {
            self.set_status(ClientStatus::End);
            self.publish(StoreEvent::End);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<String> {
        self.round_trip(false).await?;
        Ok("PONG".to_string())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.round_trip(false).await?;
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.round_trip(false).await?;
        self.insert(key, value, None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> StoreResult<()> {
        self.round_trip(false).await?;
        self.insert(key, value, Some(Duration::from_secs(seconds)));
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        self.round_trip(false).await?;
        let now = Instant::now();
        Ok(keys.iter().filter(|key| self.remove_live(key, now)).count() as u64)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.round_trip(false).await?;
        Ok(self.live_value(key).is_some())
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        self.round_trip(false).await?;
        Ok(keys.iter().map(|key| self.live_value(key)).collect())
    }

    async fn mset(&self, entries: &[(String, String)]) -> StoreResult<()> {
        self.round_trip(false).await?;
        for (key, value) in entries {
            self.insert(key, value, None);
        }
        Ok(())
    }

    async fn pipeline_set_ex(&self, entries: &[(String, String, u64)]) -> StoreResult<()> {
        self.round_trip(true).await?;
        for (key, value, seconds) in entries {
            self.insert(key, value, Some(Duration::from_secs(*seconds)));
        }
        Ok(())
    }

    async fn pipeline_del(&self, chunks: &[Vec<String>]) -> StoreResult<Vec<u64>> {
        self.round_trip(true).await?;
        let now = Instant::now();
        Ok(chunks
            .iter()
            .map(|chunk| chunk.iter().filter(|key| self.remove_live(key, now)).count() as u64)
            .collect())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        self.round_trip(false).await?;
        let now = Instant::now();

        let mut candidates: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|e| e.seq > cursor && e.is_live(now))
            .map(|e| (e.seq, e.key().clone()))
            .collect();
        candidates.sort_unstable_by_key(|(seq, _)| *seq);

        let count = count.max(1);
        let next_cursor = if candidates.len() > count {
            candidates[count - 1].0
        } else {
            0
        };

        let keys = candidates
            .into_iter()
            .take(count)
            .map(|(_, key)| key)
            .filter(|key| glob_match(pattern, key))
            .collect();

        Ok((next_cursor, keys))
    }

    async fn flushdb(&self) -> StoreResult<()> {
        self.round_trip(false).await?;
        self.entries.clear();
        Ok(())
    }

    async fn info(&self, section: &str) -> StoreResult<String> {
        self.round_trip(false).await?;
        if self.info_failure.load(Ordering::Relaxed) {
            return Err(StoreError::Backend(format!(
                "ERR INFO {} unavailable",
                section
            )));
        }

        let used = self.used_memory();
        Ok(format!(
            "# Memory\r\nused_memory:{used}\r\nused_memory_human:{human}\r\n\
             used_memory_peak:{used}\r\nmaxmemory:0\r\n",
            used = used,
            human = human_bytes(used),
        ))
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", value, UNITS[unit])
}

/// Redis-style glob: `*`, `?` and backslash escapes
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                },
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                },
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                },
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                },
            }
        }

        match star {
            Some((star_pi, star_ti)) => {
                pi = star_pi + 1;
                ti = star_ti + 1;
                star = Some((star_pi, star_ti + 1));
            },
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
