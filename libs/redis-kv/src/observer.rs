//! Observability sink for adapter lifecycle events

use crate::client::Endpoint;
use tracing::{debug, info, warn};

/// Something worth reporting about the adapter's connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Connecting { endpoint: Endpoint },
    Connected { endpoint: Endpoint },
    Ready { endpoint: Endpoint },
    Error { message: String },
    Reconnecting,
    Ended,
    /// Transport closed on request; the adapter stays usable
    Disconnected,
    Destroyed,
    /// Graceful quit failed during destroy, forced disconnect used instead
    ShutdownFallback { error: String },
    /// `clear()` without a key prefix flushed the whole database
    FullFlush { db: i64 },
}

/// Receives adapter events
pub trait AdapterObserver: Send + Sync {
    fn on_event(&self, event: &AdapterEvent);
}

/// Default observer: structured `tracing` output
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AdapterObserver for TracingObserver {
    fn on_event(&self, event: &AdapterEvent) {
        match event {
            AdapterEvent::Connecting { endpoint } => {
                info!(%endpoint, "RedisKvAdapter connecting")
            },
            AdapterEvent::Connected { endpoint } => {
                info!(%endpoint, "RedisKvAdapter connected")
            },
            AdapterEvent::Ready { endpoint } => info!(%endpoint, "RedisKvAdapter ready"),
            AdapterEvent::Error { message } => warn!(error = %message, "RedisKvAdapter error"),
            AdapterEvent::Reconnecting => debug!("RedisKvAdapter reconnecting"),
            AdapterEvent::Ended => info!("RedisKvAdapter connection ended"),
            AdapterEvent::Disconnected => info!("RedisKvAdapter disconnected"),
            AdapterEvent::Destroyed => info!("RedisKvAdapter destroyed"),
            AdapterEvent::ShutdownFallback { error } => {
                warn!(error = %error, "RedisKvAdapter graceful quit failed, forcing disconnect")
            },
            AdapterEvent::FullFlush { db } => {
                warn!(db, "RedisKvAdapter clear() without key prefix flushed the whole database")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_tracing_observer_logs() {
        let observer = TracingObserver;
        observer.on_event(&AdapterEvent::Ready {
            endpoint: Endpoint {
                host: "127.0.0.1".to_string(),
                port: 6379,
                db: 0,
            },
        });
        observer.on_event(&AdapterEvent::FullFlush { db: 4 });

        assert!(logs_contain("RedisKvAdapter ready"));
        assert!(logs_contain("flushed the whole database"));
    }
}
