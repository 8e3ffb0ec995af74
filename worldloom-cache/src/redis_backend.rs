//! Redis cache backend.
//!
//! All entries live in a dedicated logical database behind a `cache:`
//! namespace prefix. Every backend fault is swallowed per the store
//! contract: reads degrade to misses, writes and deletes to no-ops, and
//! pattern deletion reports `ok = false` with whatever it managed to delete.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};
use worldloom_core::{CacheConfig, CacheError, RedisConfig};

use crate::key::CacheKey;
use crate::stats::{CacheMetrics, StatsSnapshot};
use crate::store::{CacheStore, DelPatternOutcome};

/// SCAN batch bound. Keeps each round trip small on large keyspaces.
const SCAN_BATCH: usize = 100;

/// Redis-backed [`CacheStore`].
pub struct RedisCacheStore {
    conn: ConnectionManager,
    namespace: String,
    metrics: Arc<CacheMetrics>,
    config: CacheConfig,
}

impl RedisCacheStore {
    /// Connect to Redis. Connection failure at startup is the one cache
    /// fault that is surfaced rather than swallowed.
    pub async fn connect(redis: &RedisConfig, config: CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis.url()).map_err(|e| CacheError::Backend {
            reason: e.to_string(),
        })?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| CacheError::Backend {
                reason: e.to_string(),
            })?;

        let metrics = Arc::new(CacheMetrics::new(config.metrics_enabled));
        Ok(Self {
            conn,
            namespace: redis.key_prefix.clone(),
            metrics,
            config,
        })
    }

    /// Shared metrics registry, for wiring the auto-reset task.
    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    fn strip_namespace<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.namespace).unwrap_or(key)
    }

    fn prefix_of(key: &str) -> &str {
        key.split(':').next().unwrap_or(key)
    }

    fn ttl_seconds(&self, ttl: Option<Duration>) -> usize {
        clamp_ttl_seconds(ttl.unwrap_or(self.config.default_ttl))
    }
}

/// SETEX rejects 0; sub-second TTLs round up to the smallest expirable TTL.
fn clamp_ttl_seconds(ttl: Duration) -> usize {
    ttl.as_secs().max(1) as usize
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let rendered = key.render();
        let mut conn = self.conn.clone();

        let raw: Option<String> = match conn.get(self.namespaced(&rendered)).await {
            Ok(raw) => raw,
            Err(e) => {
                // Degraded read counts as a miss.
                warn!(key = %rendered, error = %e, "cache get failed");
                self.metrics.record_miss(key.prefix());
                return None;
            }
        };

        let value = raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %rendered, error = %e, "cache payload not valid JSON");
                None
            }
        });

        if value.is_some() {
            self.metrics.record_hit(key.prefix());
        } else {
            self.metrics.record_miss(key.prefix());
        }
        if self.config.logging_enabled {
            debug!(key = %rendered, hit = value.is_some(), "cache get");
        }
        value
    }

    async fn set(&self, key: &CacheKey, value: &serde_json::Value, ttl: Option<Duration>) {
        let rendered = key.render();
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %rendered, error = %e, "cache set skipped: unserializable value");
                return;
            }
        };

        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = conn
            .set_ex(self.namespaced(&rendered), raw, self.ttl_seconds(ttl))
            .await;
        match result {
            Ok(()) => self.metrics.record_set(key.prefix()),
            Err(e) => warn!(key = %rendered, error = %e, "cache set failed"),
        }
    }

    async fn del(&self, key: &CacheKey) -> u64 {
        let rendered = key.render();
        let mut conn = self.conn.clone();

        match conn.del::<_, u64>(self.namespaced(&rendered)).await {
            Ok(removed) => {
                self.metrics.record_invalidations(key.prefix(), removed);
                removed
            }
            Err(e) => {
                warn!(key = %rendered, error = %e, "cache del failed");
                0
            }
        }
    }

    async fn del_pattern(&self, pattern: &str) -> DelPatternOutcome {
        // The store prefixes every key, so the MATCH pattern needs the same
        // prefix; scanned keys are stripped back to logical keys before the
        // delete is issued through the prefixing path.
        let full_pattern = self.namespaced(pattern);
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let scan: Result<(u64, Vec<String>), redis::RedisError> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await;

            let (next_cursor, batch) = match scan {
                Ok(page) => page,
                Err(e) => {
                    warn!(pattern, error = %e, "cache pattern scan failed");
                    return DelPatternOutcome::failed(deleted, e.to_string());
                }
            };

            if !batch.is_empty() {
                let keys: Vec<String> = batch
                    .iter()
                    .map(|key| self.namespaced(self.strip_namespace(key)))
                    .collect();
                match conn.del::<_, u64>(keys).await {
                    Ok(removed) => deleted += removed,
                    Err(e) => {
                        warn!(pattern, error = %e, "cache pattern delete failed");
                        return DelPatternOutcome::failed(deleted, e.to_string());
                    }
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        self.metrics
            .record_invalidations(Self::prefix_of(pattern), deleted);
        DelPatternOutcome::deleted(deleted)
    }

    async fn stats(&self) -> StatsSnapshot {
        self.metrics.snapshot()
    }

    async fn reset_stats(&self) {
        self.metrics.reset();
    }
}

// ============================================================================
// TESTS
// ============================================================================
