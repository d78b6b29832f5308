//! Command executor
//!
//! Single funnel for store calls: readiness, command counters and error
//! context all happen here and nowhere else.

use crate::client::StoreResult;
use crate::connection::ConnectionManager;
use crate::error::{AdapterError, Result};
use std::future::Future;
use tracing::debug;

/// Run `call` once the connection is ready
///
/// `call` is a not-yet-polled store future; it only reaches the store after
/// readiness succeeds. Failures are counted and wrapped with `operation`.
pub async fn execute<T, F>(
    connection: &ConnectionManager,
    operation: &'static str,
    call: F,
) -> Result<T>
where
    F: Future<Output = StoreResult<T>>,
{
    let stats = connection.stats();
    stats.record_command();

    if let Err(e) = connection.ensure_ready().await {
        stats.record_failure();
        return Err(e.during(operation));
    }

    match call.await {
        Ok(value) => {
            stats.record_success();
            Ok(value)
        },
        Err(source) => {
            stats.record_failure();
            debug!("RedisKvAdapter {} failed: {}", operation, source);
            Err(AdapterError::Command { operation, source })
        },
    }
}
