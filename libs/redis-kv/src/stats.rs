//! Statistics counters and snapshot types

use crate::client::ClientStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime counters, never reset
#[derive(Debug, Default)]
pub struct StatisticsCounters {
    total_commands: AtomicU64,
    successful_commands: AtomicU64,
    failed_commands: AtomicU64,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    batches: AtomicU64,
    reconnects: AtomicU64,
    errors: AtomicU64,
}

/// Operation kinds tracked separately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Get,
    Set,
    Delete,
    Batch,
}

impl StatisticsCounters {
    pub fn record_command(&self) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_operation(&self, kind: OperationKind) {
        let counter = match kind {
            OperationKind::Get => &self.gets,
            OperationKind::Set => &self.sets,
            OperationKind::Delete => &self.deletes,
            OperationKind::Batch => &self.batches,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_commands: self.total_commands.load(Ordering::Relaxed),
            successful_commands: self.successful_commands.load(Ordering::Relaxed),
            failed_commands: self.failed_commands.load(Ordering::Relaxed),
            operations: OperationCounts {
                gets: self.gets.load(Ordering::Relaxed),
                sets: self.sets.load(Ordering::Relaxed),
                deletes: self.deletes.load(Ordering::Relaxed),
                batches: self.batches.load(Ordering::Relaxed),
            },
            connection_events: ConnectionEventCounts {
                reconnects: self.reconnects.load(Ordering::Relaxed),
                errors: self.errors.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounts {
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub batches: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEventCounts {
    pub reconnects: u64,
    pub errors: u64,
}

/// Point-in-time copy of [`StatisticsCounters`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub total_commands: u64,
    pub successful_commands: u64,
    pub failed_commands: u64,
    pub operations: OperationCounts,
    pub connection_events: ConnectionEventCounts,
}

/// Connection endpoint metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub status: ClientStatus,
}

/// Store-reported memory usage from `INFO memory`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used_memory: Option<u64>,
    pub used_memory_human: Option<String>,
    pub used_memory_peak: Option<u64>,
    pub maxmemory: Option<u64>,
}

impl MemoryUsage {
    /// Parse the `key:value` lines of an INFO reply; unknown keys and
    /// `# Section` headers are ignored
    pub fn parse(info: &str) -> Self {
        let mut usage = MemoryUsage::default();
        for line in info.lines() {
            let Some((key, value)) = line.trim().split_once(':') else {
                continue;
            };
            match key {
                "used_memory" => usage.used_memory = value.parse().ok(),
                "used_memory_human" => usage.used_memory_human = Some(value.to_string()),
                "used_memory_peak" => usage.used_memory_peak = value.parse().ok(),
                "maxmemory" => usage.maxmemory = value.parse().ok(),
                _ => {},
            }
        }
        usage
    }
}

/// Result of `get_statistics()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStatistics {
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    /// None when the INFO query failed or the adapter is not connected
    pub memory: Option<MemoryUsage>,
    pub connection: ConnectionInfo,
}

/// Result of `get_health_status()`, computed fresh on each call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub connected: bool,
    /// Ping round trip in milliseconds, absent when the probe failed
    pub latency_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = StatisticsCounters::default();
        counters.record_command();
        counters.record_command();
        counters.record_success();
        counters.record_failure();
        counters.record_operation(OperationKind::Batch);
        counters.record_reconnect();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total_commands, 2);
        assert_eq!(snapshot.successful_commands, 1);
        assert_eq!(snapshot.failed_commands, 1);
        assert_eq!(snapshot.operations.batches, 1);
        assert_eq!(snapshot.operations.gets, 0);
        assert_eq!(snapshot.connection_events.reconnects, 1);
    }

    #[test]
    fn test_parse_memory_info() {
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n\
                    used_memory_rss:2000000\r\nused_memory_peak:2097152\r\nmaxmemory:0\r\n";
        let usage = MemoryUsage::parse(info);
        assert_eq!(usage.used_memory, Some(1_048_576));
        assert_eq!(usage.used_memory_human.as_deref(), Some("1.00M"));
        assert_eq!(usage.used_memory_peak, Some(2_097_152));
        assert_eq!(usage.maxmemory, Some(0));
    }

    #[test]
    fn test_parse_empty_info() {
        assert_eq!(MemoryUsage::parse(""), MemoryUsage::default());
    }
}
