//! Health probe and statistics

use crate::adapter::RedisKvAdapter;
use crate::connection::ConnectionState;
use crate::stats::{AdapterStatistics, HealthSnapshot, MemoryUsage};
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A ping slower than this counts as unhealthy
pub const HEALTH_LATENCY_THRESHOLD: Duration = Duration::from_millis(1000);

struct Probe {
    latency: Option<Duration>,
    error: Option<String>,
}

impl Probe {
    fn healthy(&self) -> bool {
        self.latency
            .is_some_and(|latency| latency < HEALTH_LATENCY_THRESHOLD)
    }
}

impl RedisKvAdapter {
    async fn probe(&self) -> Probe {
        let started = Instant::now();
        match self.ping().await {
            Ok(_) => Probe {
                latency: Some(started.elapsed()),
                error: None,
            },
            Err(e) => Probe {
                latency: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Timed ping; never fails
    pub async fn is_healthy(&self) -> bool {
        self.probe().await.healthy()
    }

    /// Timed ping as a structured snapshot; never fails
    pub async fn get_health_status(&self) -> HealthSnapshot {
        let probe = self.probe().await;
        HealthSnapshot {
            healthy: probe.healthy(),
            connected: self.state() == ConnectionState::Ready,
            latency_ms: probe
                .latency
                .map(|latency| u64::try_from(latency.as_millis()).unwrap_or(u64::MAX)),
            timestamp: Utc::now(),
            error: probe.error,
        }
    }

    /// Counters, connection metadata and, when available, store memory usage
    ///
    /// The INFO query is not counted as a command and its failure only
    /// leaves `memory` empty.
    pub async fn get_statistics(&self) -> AdapterStatistics {
        let memory = if self.state() == ConnectionState::Ready {
            match self.client().info("memory").await {
                Ok(info) => Some(MemoryUsage::parse(&info)),
                Err(e) => {
                    debug!("RedisKvAdapter INFO memory failed: {}", e);
                    None
                },
            }
        } else {
            None
        };

        AdapterStatistics {
            counters: self.stats().snapshot(),
            memory,
            connection: self.get_connection_info(),
        }
    }
}
