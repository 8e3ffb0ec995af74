//! Entity-shape-aware cascade invalidation policies.
//!
//! Each policy knows which derived caches a mutation poisons and deletes
//! them in bulk. Cascades are idempotent and, like everything else in this
//! crate, never fail the caller: a partially applied cascade reports
//! `ok = false` and the count it did manage to delete.

use std::sync::Arc;

use tracing::info;
use worldloom_core::{BranchId, EntityId, EntityType};

use crate::key::{patterns, prefixes, CacheKey};
use crate::stats::CacheMetrics;
use crate::store::CacheStore;

/// Combined outcome of one cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub ok: bool,
    pub keys_deleted: u64,
}

impl CascadeOutcome {
    fn merge(&mut self, ok: bool, keys_deleted: u64) {
        self.ok &= ok;
        self.keys_deleted += keys_deleted;
    }
}

impl Default for CascadeOutcome {
    fn default() -> Self {
        Self {
            ok: true,
            keys_deleted: 0,
        }
    }
}

/// Cascade invalidation policies layered over a [`CacheStore`].
pub struct CascadeInvalidator {
    store: Arc<dyn CacheStore>,
    metrics: Option<Arc<CacheMetrics>>,
}

impl CascadeInvalidator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    /// Attach the metrics registry so cascades are counted separately from
    /// plain invalidations.
    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Generic per-entity invalidation used by version writes: drops the
    /// entity's resolved payload and computed-fields caches. Mutations on
    /// settlements and structures should go through the shaped cascades
    /// below, which know the entity relationships.
    pub async fn entity_changed(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        branch_id: BranchId,
    ) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();

        for prefix in [prefixes::ENTITY, prefixes::COMPUTED_FIELDS] {
            let deleted = self
                .store
                .del(&CacheKey::entity(prefix, entity_type, entity_id, branch_id))
                .await;
            outcome.merge(true, deleted);
        }

        self.finish(entity_type.as_str(), &outcome);
        outcome
    }

    /// Settlement cascade: the settlement's own derived caches, every
    /// structure computed cache in the branch, and the spatial region
    /// listings.
    ///
    /// Invalidating ALL structure computed caches in the branch
    /// over-invalidates; the alternative is a relationship lookup the cache
    /// layer must not perform.
    pub async fn settlement_changed(
        &self,
        settlement_id: EntityId,
        branch_id: BranchId,
    ) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();

        let deleted = self
            .store
            .del(&CacheKey::entity(
                prefixes::COMPUTED_FIELDS,
                EntityType::Settlement,
                settlement_id,
                branch_id,
            ))
            .await;
        outcome.merge(true, deleted);

        let deleted = self
            .store
            .del(&CacheKey::entity(
                prefixes::STRUCTURES,
                EntityType::Settlement,
                settlement_id,
                branch_id,
            ))
            .await;
        outcome.merge(true, deleted);

        let result = self
            .store
            .del_pattern(&patterns::typed_in_branch(
                prefixes::COMPUTED_FIELDS,
                EntityType::Structure,
                branch_id,
            ))
            .await;
        outcome.merge(result.ok, result.keys_deleted);

        let result = self
            .store
            .del_pattern(&format!(
                "{}:settlements-in-region:*:{}",
                prefixes::SPATIAL,
                branch_id
            ))
            .await;
        outcome.merge(result.ok, result.keys_deleted);

        self.finish("settlement", &outcome);
        outcome
    }

    /// Structure cascade: the structure's computed cache plus the owning
    /// settlement's computed and structure-list caches. Spatial caches are
    /// untouched - structures do not move settlements.
    pub async fn structure_changed(
        &self,
        structure_id: EntityId,
        settlement_id: EntityId,
        branch_id: BranchId,
    ) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();

        let keys = [
            CacheKey::entity(
                prefixes::COMPUTED_FIELDS,
                EntityType::Structure,
                structure_id,
                branch_id,
            ),
            CacheKey::entity(
                prefixes::COMPUTED_FIELDS,
                EntityType::Settlement,
                settlement_id,
                branch_id,
            ),
            CacheKey::entity(
                prefixes::STRUCTURES,
                EntityType::Settlement,
                settlement_id,
                branch_id,
            ),
        ];
        for key in &keys {
            let deleted = self.store.del(key).await;
            outcome.merge(true, deleted);
        }

        self.finish("structure", &outcome);
        outcome
    }

    /// Campaign-wide computed invalidation, used when computed-field
    /// definitions themselves change.
    pub async fn computed_field_definitions_changed(
        &self,
        branch_id: BranchId,
    ) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();

        for entity_type in [EntityType::Settlement, EntityType::Structure] {
            let result = self
                .store
                .del_pattern(&patterns::typed_in_branch(
                    prefixes::COMPUTED_FIELDS,
                    entity_type,
                    branch_id,
                ))
                .await;
            outcome.merge(result.ok, result.keys_deleted);
        }

        self.finish("computed-fields", &outcome);
        outcome
    }

    /// Branch-wide invalidation on branch deletion: `*:{branch}`.
    pub async fn branch_deleted(&self, branch_id: BranchId) -> CascadeOutcome {
        let result = self.store.del_pattern(&patterns::branch(branch_id)).await;
        let outcome = CascadeOutcome {
            ok: result.ok,
            keys_deleted: result.keys_deleted,
        };

        self.finish("branch", &outcome);
        outcome
    }

    fn finish(&self, trigger: &str, outcome: &CascadeOutcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cascade_invalidations(trigger, outcome.keys_deleted);
        }
        info!(
            trigger,
            keys_deleted = outcome.keys_deleted,
            ok = outcome.ok,
            "cascade invalidation"
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
