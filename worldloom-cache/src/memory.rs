//! In-memory cache store for tests and development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::debug;
use worldloom_core::{CacheConfig, Timestamp};

use crate::key::CacheKey;
use crate::stats::{CacheMetrics, StatsSnapshot};
use crate::store::{CacheStore, DelPatternOutcome};

/// Translate a Redis glob pattern (`*`, `?`) into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            ch => regex.push_str(&regex::escape(&ch.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).ok()
}

struct Entry {
    value: serde_json::Value,
    expires_at: Timestamp,
}

impl Entry {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// In-memory [`CacheStore`] implementation.
///
/// Entries expire lazily on read. Pattern deletion matches with the same
/// glob semantics the Redis backend gets from `SCAN MATCH`.
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    metrics: Arc<CacheMetrics>,
    config: CacheConfig,
}

impl InMemoryCacheStore {
    pub fn new(config: CacheConfig) -> Self {
        let metrics = Arc::new(CacheMetrics::new(config.metrics_enabled));
        Self {
            entries: RwLock::new(HashMap::new()),
            metrics,
            config,
        }
    }

    /// Shared metrics registry, for wiring the auto-reset task.
    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prefix_of(key: &str) -> &str {
        key.split(':').next().unwrap_or(key)
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let rendered = key.render();
        let now = Utc::now();

        let value = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries
                .get(&rendered)
                .filter(|entry| !entry.is_expired(now))
                .map(|entry| entry.value.clone())
        };

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
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.render(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        self.metrics.record_set(key.prefix());
    }

    async fn del(&self, key: &CacheKey) -> u64 {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let removed = entries.remove(&key.render()).is_some() as u64;
        self.metrics.record_invalidations(key.prefix(), removed);
        removed
    }

    async fn del_pattern(&self, pattern: &str) -> DelPatternOutcome {
        let Some(regex) = glob_to_regex(pattern) else {
            return DelPatternOutcome::failed(0, format!("bad pattern: {pattern}"));
        };

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let matched: Vec<String> = entries
            .keys()
            .filter(|key| regex.is_match(key))
            .cloned()
            .collect();
        for key in &matched {
            entries.remove(key);
        }

        let deleted = matched.len() as u64;
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
