//! Batch operations
//!
//! Each batch costs one store round trip regardless of size. Empty inputs
//! return immediately without touching the store or the counters.

use crate::adapter::{ttl_seconds, RedisKvAdapter};
use crate::error::Result;
use crate::executor::execute;
use crate::stats::OperationKind;
use serde_json::Value;
use std::time::Duration;

/// Above this many keys `delete_many` splits into pipelined DEL chunks
pub const DELETE_CHUNK_SIZE: usize = 100;

impl RedisKvAdapter {
    /// One value slot per requested key, in request order
    pub async fn mget<K: AsRef<str> + Sync>(&self, keys: &[K]) -> Result<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.stats().record_operation(OperationKind::Batch);

        let keys: Vec<String> = keys.iter().map(|k| self.key(k.as_ref())).collect();
        let raw = execute(&self.connection, "mget", self.client().mget(&keys)).await?;

        raw.into_iter()
            .map(|slot| slot.map(|raw| self.decode("mget", &raw)).transpose())
            .collect()
    }

    /// Write all entries in one round trip
    ///
    /// With an effective TTL the entries go out as one pipeline of expiring
    /// SETs; without one as a single MSET.
    pub async fn mset<K: AsRef<str> + Sync>(
        &self,
        entries: &[(K, Value)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.stats().record_operation(OperationKind::Batch);

        let ttl = self.config.effective_ttl(ttl);
        if ttl.is_zero() {
            let pairs = entries
                .iter()
                .map(|(key, value)| Ok((self.key(key.as_ref()), self.encode("mset", value)?)))
                .collect::<Result<Vec<(String, String)>>>()?;
            execute(&self.connection, "mset", self.client().mset(&pairs)).await
        } else {
            let seconds = ttl_seconds(ttl);
            let writes = entries
                .iter()
                .map(|(key, value)| {
                    Ok((
                        self.key(key.as_ref()),
                        self.encode("mset", value)?,
                        seconds,
                    ))
                })
                .collect::<Result<Vec<(String, String, u64)>>>()?;
            execute(
                &self.connection,
                "mset",
                self.client().pipeline_set_ex(&writes),
            )
            .await
        }
    }

    /// True when at least one key was removed
    pub async fn delete_many<K: AsRef<str> + Sync>(&self, keys: &[K]) -> Result<bool> {
        if keys.is_empty() {
            return Ok(false);
        }
        self.stats().record_operation(OperationKind::Batch);

        let keys: Vec<String> = keys.iter().map(|k| self.key(k.as_ref())).collect();
        let removed: u64 = if keys.len() > DELETE_CHUNK_SIZE {
            let chunks: Vec<Vec<String>> = keys
                .chunks(DELETE_CHUNK_SIZE)
                .map(<[String]>::to_vec)
                .collect();
            let counts = execute(
                &self.connection,
                "delete_many",
                self.client().pipeline_del(&chunks),
            )
            .await?;
            counts.iter().sum()
        } else {
            execute(&self.connection, "delete_many", self.client().del(&keys)).await?
        };

        Ok(removed > 0)
    }
}
