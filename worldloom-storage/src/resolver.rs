//! As-of version resolution across the branch ancestry chain.

use std::sync::Arc;

use worldloom_core::{BranchId, EntityId, EntityType, LoomResult, Version, WorldTime};

use crate::branches::BranchTree;
use crate::store::TimelineStore;

/// Resolves the effective version of an entity for a `(branch, world-time)`
/// query.
///
/// Walks the ancestry chain; in each ancestor the query time is clamped to
/// the divergence point of the branch the walk came from, so a branch never
/// observes mutations an ancestor made after the fork.
pub struct VersionResolver {
    store: Arc<dyn TimelineStore>,
    branches: BranchTree,
}

impl VersionResolver {
    pub fn new(store: Arc<dyn TimelineStore>) -> Self {
        let branches = BranchTree::new(store.clone());
        Self { store, branches }
    }

    /// Resolve an entity as of `world_time` on `branch_id`.
    ///
    /// Returns `None` when no ancestor holds a covering version.
    pub async fn resolve(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        branch_id: BranchId,
        world_time: WorldTime,
    ) -> LoomResult<Option<Version>> {
        let chain = self.branches.ancestors(branch_id).await?;
        let mut limit = world_time;

        for branch in chain {
            let versions = self
                .store
                .version_list_for_entity(entity_type, entity_id, branch.id)
                .await?;
            // Sorted by valid_from: the last covering interval is the
            // latest one at or before the (possibly clamped) query time.
            if let Some(version) = versions.iter().rev().find(|v| v.covers(limit)) {
                return Ok(Some(version.clone()));
            }

            // Moving into the parent: only versions at or before our
            // divergence point are visible there.
            if let Some(diverged_at) = branch.diverged_at {
                limit = limit.min(diverged_at);
            }
        }
        Ok(None)
    }
}

// ============================================================================
// TESTS
// ============================================================================
