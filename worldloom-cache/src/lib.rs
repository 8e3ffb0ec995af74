//! Worldloom Cache - Branch-Aware Hierarchical Cache
//!
//! Cache keys place the branch ID last so a whole branch can be invalidated
//! with one wildcard pattern. The store contract is graceful degradation:
//! cache faults are swallowed into misses and no-ops, never surfaced as
//! errors to the rest of the system.

pub mod cascade;
pub mod key;
pub mod memory;
pub mod redis_backend;
pub mod stats;
pub mod store;

pub use cascade::{CascadeInvalidator, CascadeOutcome};
pub use key::{patterns, prefixes, CacheKey};
pub use memory::InMemoryCacheStore;
pub use redis_backend::RedisCacheStore;
pub use stats::{AutoResetGuard, CacheMetrics, PrefixCounters, StatsSnapshot};
pub use store::{CacheStore, DelPatternOutcome};
