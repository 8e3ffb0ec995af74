//! Cache store trait with the graceful degradation contract.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::key::CacheKey;
use crate::stats::StatsSnapshot;

/// Outcome of a pattern deletion.
///
/// Pattern deletion never fails loudly: backend errors land in `error` with
/// `ok = false` and whatever count was deleted before the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelPatternOutcome {
    pub ok: bool,
    pub keys_deleted: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DelPatternOutcome {
    pub fn deleted(keys_deleted: u64) -> Self {
        Self {
            ok: true,
            keys_deleted,
            error: None,
        }
    }

    pub fn failed(keys_deleted: u64, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            keys_deleted,
            error: Some(error.into()),
        }
    }
}

/// Branch-aware cache store.
///
/// # Graceful degradation
///
/// Cache faults must not break correctness of the rest of the system, so no
/// method returns an error: `get` reports a miss on backend failure, `set`
/// and `del` become no-ops, and `del_pattern` reports `ok = false`. Backends
/// log the swallowed error at warn level.
///
/// # Complexity
///
/// `get`/`set`/`del` are O(1) expected; `del_pattern` is O(n) over matched
/// keys and must scan incrementally with a bounded batch size.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value. Absent on miss, expiry, or backend failure.
    async fn get(&self, key: &CacheKey) -> Option<serde_json::Value>;

    /// Store a value with a TTL (the configured default when `None`).
    async fn set(&self, key: &CacheKey, value: &serde_json::Value, ttl: Option<Duration>);

    /// Delete a single key, returning how many entries were removed.
    async fn del(&self, key: &CacheKey) -> u64;

    /// Delete every key matching a Redis-glob pattern.
    async fn del_pattern(&self, pattern: &str) -> DelPatternOutcome;

    /// Aggregate statistics snapshot.
    async fn stats(&self) -> StatsSnapshot;

    /// Clear all counters and restart the reporting window.
    async fn reset_stats(&self);
}
