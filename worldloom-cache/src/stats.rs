//! Per-prefix cache statistics.
//!
//! Counters are process-local and monotonic; snapshots aggregate them into
//! the reporting shape. An optional auto-reset task clears the counters on a
//! fixed period for time-windowed reporting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use worldloom_core::Timestamp;

/// Estimated recomputation cost avoided per hit, in milliseconds by prefix.
fn prefix_cost_ms(prefix: &str) -> u64 {
    match prefix {
        "computed-fields" => 300,
        "spatial" => 100,
        // List-shaped prefixes are cheap to rebuild.
        "structures" | "settlements" | "encounters" | "events" => 25,
        _ => 50,
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    invalidations: AtomicU64,
    cascade_invalidations: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PrefixCounters {
        PrefixCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            cascade_invalidations: self.cascade_invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of one prefix's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixCounters {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub cascade_invalidations: u64,
}

/// Aggregate statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub by_type: BTreeMap<String, PrefixCounters>,
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
    pub total_sets: u64,
    pub total_invalidations: u64,
    pub total_cascade_invalidations: u64,
    pub start_time: Timestamp,
    pub enabled: bool,
}

/// Process-wide cache metrics registry.
///
/// Backends share one instance; every operation increments the counters for
/// the key's prefix. Increments are atomic and lock-free.
pub struct CacheMetrics {
    enabled: bool,
    by_prefix: DashMap<String, Counters>,
    start_time: RwLock<Timestamp>,
}

impl CacheMetrics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            by_prefix: DashMap::new(),
            start_time: RwLock::new(Utc::now()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_hit(&self, prefix: &str) {
        self.bump(prefix, |c| &c.hits, 1);
    }

    pub fn record_miss(&self, prefix: &str) {
        self.bump(prefix, |c| &c.misses, 1);
    }

    pub fn record_set(&self, prefix: &str) {
        self.bump(prefix, |c| &c.sets, 1);
    }

    pub fn record_invalidations(&self, prefix: &str, count: u64) {
        self.bump(prefix, |c| &c.invalidations, count);
    }

    pub fn record_cascade_invalidations(&self, prefix: &str, count: u64) {
        self.bump(prefix, |c| &c.cascade_invalidations, count);
    }

    fn bump(&self, prefix: &str, field: impl Fn(&Counters) -> &AtomicU64, count: u64) {
        if !self.enabled || count == 0 {
            return;
        }
        let entry = self.by_prefix.entry(prefix.to_string()).or_default();
        field(entry.value()).fetch_add(count, Ordering::Relaxed);
    }

    /// Aggregate all per-prefix counters into a reporting snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut by_type = BTreeMap::new();
        let mut totals = PrefixCounters::default();

        for entry in self.by_prefix.iter() {
            let counters = entry.value().snapshot();
            totals.hits += counters.hits;
            totals.misses += counters.misses;
            totals.sets += counters.sets;
            totals.invalidations += counters.invalidations;
            totals.cascade_invalidations += counters.cascade_invalidations;
            by_type.insert(entry.key().clone(), counters);
        }

        let lookups = totals.hits + totals.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            totals.hits as f64 / lookups as f64
        };

        StatsSnapshot {
            by_type,
            total_hits: totals.hits,
            total_misses: totals.misses,
            hit_rate,
            total_sets: totals.sets,
            total_invalidations: totals.invalidations,
            total_cascade_invalidations: totals.cascade_invalidations,
            start_time: *self.start_time.read().unwrap_or_else(|e| e.into_inner()),
            enabled: self.enabled,
        }
    }

    /// Clear all counters and restart the reporting window.
    pub fn reset(&self) {
        self.by_prefix.clear();
        *self.start_time.write().unwrap_or_else(|e| e.into_inner()) = Utc::now();
    }

    /// Estimated wall-clock time saved by hits, using per-prefix costs.
    pub fn estimated_time_saved(&self) -> Duration {
        let millis: u64 = self
            .by_prefix
            .iter()
            .map(|entry| prefix_cost_ms(entry.key()) * entry.value().hits.load(Ordering::Relaxed))
            .sum();
        Duration::from_millis(millis)
    }

    /// Spawn the auto-reset task. The task is aborted when the returned
    /// guard drops, tying it to the process lifecycle hooks.
    pub fn spawn_auto_reset(self: &Arc<Self>, period: Duration) -> AutoResetGuard {
        let metrics = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics.reset();
            }
        });
        AutoResetGuard { handle }
    }
}

/// Aborts the auto-reset task on drop.
pub struct AutoResetGuard {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for AutoResetGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics::new(true);
        for _ in 0..8 {
            metrics.record_hit("entity");
        }
        metrics.record_miss("entity");
        metrics.record_miss("computed-fields");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_hits, 8);
        assert_eq!(snapshot.total_misses, 2);
        assert!((snapshot.hit_rate - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_empty_hit_rate_is_zero() {
        let metrics = CacheMetrics::new(true);
        assert_eq!(metrics.snapshot().hit_rate, 0.0);
    }

    #[test]
    fn test_disabled_metrics_record_nothing() {
        let metrics = CacheMetrics::new(false);
        metrics.record_hit("entity");
        metrics.record_set("entity");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_hits, 0);
        assert_eq!(snapshot.total_sets, 0);
        assert!(!snapshot.enabled);
    }

    #[test]
    fn test_per_prefix_counters() {
        let metrics = CacheMetrics::new(true);
        metrics.record_set("computed-fields");
        metrics.record_invalidations("computed-fields", 3);
        metrics.record_cascade_invalidations("spatial", 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.by_type["computed-fields"].sets, 1);
        assert_eq!(snapshot.by_type["computed-fields"].invalidations, 3);
        assert_eq!(snapshot.by_type["spatial"].cascade_invalidations, 2);
        assert_eq!(snapshot.total_cascade_invalidations, 2);
    }

    #[test]
    fn test_reset_clears_counters_and_moves_window() {
        let metrics = CacheMetrics::new(true);
        metrics.record_hit("entity");
        let before = metrics.snapshot();

        metrics.reset();
        let after = metrics.snapshot();

        assert_eq!(after.total_hits, 0);
        assert!(after.start_time >= before.start_time);
    }

    #[test]
    fn test_time_saved_estimator_uses_prefix_costs() {
        let metrics = CacheMetrics::new(true);
        for _ in 0..2 {
            metrics.record_hit("computed-fields"); // 300ms each
        }
        metrics.record_hit("spatial"); // 100ms
        metrics.record_hit("structures"); // 25ms
        metrics.record_hit("entity"); // default 50ms

        assert_eq!(
            metrics.estimated_time_saved(),
            Duration::from_millis(300 * 2 + 100 + 25 + 50)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_reset_clears_on_period() {
        let metrics = Arc::new(CacheMetrics::new(true));
        let _guard = metrics.spawn_auto_reset(Duration::from_millis(100));

        metrics.record_hit("entity");
        assert_eq!(metrics.snapshot().total_hits, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Yield so the reset task gets scheduled.
        tokio::task::yield_now().await;
        assert_eq!(metrics.snapshot().total_hits, 0);
    }
}
