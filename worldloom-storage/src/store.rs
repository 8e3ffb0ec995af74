//! Timeline store trait and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use worldloom_core::{
    Branch, BranchId, CampaignId, Effect, EffectExecution, EffectId, EntityId, EntityType,
    ExecutionId, LoomError, LoomResult, MergeHistory, MergeId, ResolutionState,
    StoreError, Timestamp, Version, VersionId, WorldTime,
};

/// Async store for branches, versions, effects, executions, and merge
/// history.
///
/// Row-level operations only; the engines compose them. Database
/// implementations must run each engine-level compound operation inside one
/// serializable transaction; the in-memory implementation approximates this
/// with per-table locks and is intended for tests and development.
#[async_trait]
pub trait TimelineStore: Send + Sync {
    // ========================================================================
    // BRANCH OPERATIONS
    // ========================================================================

    /// Insert a new branch.
    async fn branch_insert(&self, branch: &Branch) -> LoomResult<()>;

    /// Get a branch by ID.
    async fn branch_get(&self, id: BranchId) -> LoomResult<Option<Branch>>;

    /// Find a branch by its campaign-unique name.
    async fn branch_find_by_name(
        &self,
        campaign_id: CampaignId,
        name: &str,
    ) -> LoomResult<Option<Branch>>;

    /// List all branches in a campaign.
    async fn branch_list_by_campaign(&self, campaign_id: CampaignId) -> LoomResult<Vec<Branch>>;

    /// List the direct children of a branch.
    async fn branch_children(&self, id: BranchId) -> LoomResult<Vec<Branch>>;

    /// Delete a branch row together with every version it owns.
    async fn branch_delete(&self, id: BranchId) -> LoomResult<()>;

    // ========================================================================
    // VERSION OPERATIONS
    // ========================================================================

    /// Insert a new version row.
    async fn version_insert(&self, version: &Version) -> LoomResult<()>;

    /// Get a version by ID.
    async fn version_get(&self, id: VersionId) -> LoomResult<Option<Version>>;

    /// Find the open (`valid_to = None`) interval for an entity on a branch.
    async fn version_find_open(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        branch_id: BranchId,
    ) -> LoomResult<Option<Version>>;

    /// Close an interval by setting its `valid_to`.
    async fn version_close(&self, id: VersionId, valid_to: WorldTime) -> LoomResult<()>;

    /// Remove a version row. Only the equal-`valid_from` replacement path
    /// uses this; versions are otherwise immutable.
    async fn version_delete(&self, id: VersionId) -> LoomResult<()>;

    /// All versions for an entity on one branch, sorted by `valid_from`.
    async fn version_list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        branch_id: BranchId,
    ) -> LoomResult<Vec<Version>>;

    /// Distinct `(entity_type, entity_id)` pairs with at least one version
    /// in any of the given branches.
    async fn version_entities_in_branches(
        &self,
        branch_ids: &[BranchId],
    ) -> LoomResult<Vec<(EntityType, EntityId)>>;

    // ========================================================================
    // MERGE HISTORY OPERATIONS
    // ========================================================================

    /// Append a merge history record.
    async fn merge_history_insert(&self, record: &MergeHistory) -> LoomResult<()>;

    /// Merge records where the branch was source or target, newest first.
    async fn merge_history_for_branch(&self, branch_id: BranchId)
        -> LoomResult<Vec<MergeHistory>>;

    // ========================================================================
    // EFFECT OPERATIONS
    // ========================================================================

    /// Insert a new effect.
    async fn effect_insert(&self, effect: &Effect) -> LoomResult<()>;

    /// Get an effect by ID.
    async fn effect_get(&self, id: EffectId) -> LoomResult<Option<Effect>>;

    /// Effects attached to an entity, sorted by creation order.
    async fn effect_list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        active_only: bool,
    ) -> LoomResult<Vec<Effect>>;

    /// Append an effect execution record.
    async fn execution_insert(&self, execution: &EffectExecution) -> LoomResult<()>;

    /// Execution records for one effect, oldest first.
    async fn execution_list_for_effect(
        &self,
        effect_id: EffectId,
    ) -> LoomResult<Vec<EffectExecution>>;

    /// Execution records for one target entity, oldest first.
    async fn execution_list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> LoomResult<Vec<EffectExecution>>;

    // ========================================================================
    // ENTITY SHELL OPERATIONS
    // ========================================================================

    /// Read the resolution flag of an encounter/event shell row.
    async fn resolution_state_get(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> LoomResult<ResolutionState>;

    /// Mark an encounter/event shell row resolved.
    async fn resolution_mark_resolved(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        at: Timestamp,
    ) -> LoomResult<()>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

type Table<K, V> = Arc<RwLock<HashMap<K, V>>>;

fn read<K, V>(table: &Table<K, V>) -> LoomResult<std::sync::RwLockReadGuard<'_, HashMap<K, V>>> {
    table
        .read()
        .map_err(|_| LoomError::Store(StoreError::LockPoisoned))
}

fn write<K, V>(table: &Table<K, V>) -> LoomResult<std::sync::RwLockWriteGuard<'_, HashMap<K, V>>> {
    table
        .write()
        .map_err(|_| LoomError::Store(StoreError::LockPoisoned))
}

/// In-memory timeline store for tests and development.
#[derive(Debug, Default)]
pub struct MemoryTimelineStore {
    branches: Table<BranchId, Branch>,
    versions: Table<VersionId, Version>,
    merges: Table<MergeId, MergeHistory>,
    effects: Table<EffectId, Effect>,
    executions: Table<ExecutionId, EffectExecution>,
    resolution_flags: Table<(EntityType, EntityId), ResolutionState>,
}

impl MemoryTimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored branches.
    pub fn branch_count(&self) -> usize {
        self.branches.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Number of stored versions.
    pub fn version_count(&self) -> usize {
        self.versions.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Number of stored merge history records.
    pub fn merge_count(&self) -> usize {
        self.merges.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Number of stored execution records.
    pub fn execution_count(&self) -> usize {
        self.executions.read().map(|t| t.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TimelineStore for MemoryTimelineStore {
    // === Branch Operations ===

    async fn branch_insert(&self, branch: &Branch) -> LoomResult<()> {
        let mut branches = write(&self.branches)?;
        if branches.contains_key(&branch.id) {
            return Err(StoreError::Duplicate {
                entity: "branch",
                id: branch.id.as_uuid(),
            }
            .into());
        }
        branches.insert(branch.id, branch.clone());
        Ok(())
    }

    async fn branch_get(&self, id: BranchId) -> LoomResult<Option<Branch>> {
        Ok(read(&self.branches)?.get(&id).cloned())
    }

    async fn branch_find_by_name(
        &self,
        campaign_id: CampaignId,
        name: &str,
    ) -> LoomResult<Option<Branch>> {
        Ok(read(&self.branches)?
            .values()
            .find(|b| b.campaign_id == campaign_id && b.name == name)
            .cloned())
    }

    async fn branch_list_by_campaign(&self, campaign_id: CampaignId) -> LoomResult<Vec<Branch>> {
        let mut result: Vec<Branch> = read(&self.branches)?
            .values()
            .filter(|b| b.campaign_id == campaign_id)
            .cloned()
            .collect();
        result.sort_by_key(|b| b.created_at);
        Ok(result)
    }

    async fn branch_children(&self, id: BranchId) -> LoomResult<Vec<Branch>> {
        let mut result: Vec<Branch> = read(&self.branches)?
            .values()
            .filter(|b| b.parent_id == Some(id))
            .cloned()
            .collect();
        result.sort_by_key(|b| b.created_at);
        Ok(result)
    }

    async fn branch_delete(&self, id: BranchId) -> LoomResult<()> {
        let mut branches = write(&self.branches)?;
        if branches.remove(&id).is_none() {
            return Err(LoomError::not_found("branch", id.as_uuid()));
        }
        drop(branches);

        let mut versions = write(&self.versions)?;
        versions.retain(|_, v| v.branch_id != id);
        Ok(())
    }

    // === Version Operations ===

    async fn version_insert(&self, version: &Version) -> LoomResult<()> {
        let mut versions = write(&self.versions)?;
        if versions.contains_key(&version.id) {
            return Err(StoreError::Duplicate {
                entity: "version",
                id: version.id.as_uuid(),
            }
            .into());
        }
        versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn version_get(&self, id: VersionId) -> LoomResult<Option<Version>> {
        Ok(read(&self.versions)?.get(&id).cloned())
    }

    async fn version_find_open(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        branch_id: BranchId,
    ) -> LoomResult<Option<Version>> {
        Ok(read(&self.versions)?
            .values()
            .find(|v| {
                v.entity_type == entity_type
                    && v.entity_id == entity_id
                    && v.branch_id == branch_id
                    && v.valid_to.is_none()
            })
            .cloned())
    }

    async fn version_close(&self, id: VersionId, valid_to: WorldTime) -> LoomResult<()> {
        let mut versions = write(&self.versions)?;
        let version = versions
            .get_mut(&id)
            .ok_or_else(|| LoomError::not_found("version", id.as_uuid()))?;
        version.valid_to = Some(valid_to);
        Ok(())
    }

    async fn version_delete(&self, id: VersionId) -> LoomResult<()> {
        let mut versions = write(&self.versions)?;
        if versions.remove(&id).is_none() {
            return Err(LoomError::not_found("version", id.as_uuid()));
        }
        Ok(())
    }

    async fn version_list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        branch_id: BranchId,
    ) -> LoomResult<Vec<Version>> {
        let mut result: Vec<Version> = read(&self.versions)?
            .values()
            .filter(|v| {
                v.entity_type == entity_type
                    && v.entity_id == entity_id
                    && v.branch_id == branch_id
            })
            .cloned()
            .collect();
        result.sort_by_key(|v| v.valid_from);
        Ok(result)
    }

    async fn version_entities_in_branches(
        &self,
        branch_ids: &[BranchId],
    ) -> LoomResult<Vec<(EntityType, EntityId)>> {
        let wanted: HashSet<BranchId> = branch_ids.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut result = Vec::new();

        let versions = read(&self.versions)?;
        let mut rows: Vec<&Version> = versions
            .values()
            .filter(|v| wanted.contains(&v.branch_id))
            .collect();
        rows.sort_by_key(|v| v.created_at);
        for version in rows {
            if seen.insert((version.entity_type, version.entity_id)) {
                result.push((version.entity_type, version.entity_id));
            }
        }
        Ok(result)
    }

    // === Merge History Operations ===

    async fn merge_history_insert(&self, record: &MergeHistory) -> LoomResult<()> {
        let mut merges = write(&self.merges)?;
        if merges.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                entity: "merge",
                id: record.id.as_uuid(),
            }
            .into());
        }
        merges.insert(record.id, record.clone());
        Ok(())
    }

    async fn merge_history_for_branch(
        &self,
        branch_id: BranchId,
    ) -> LoomResult<Vec<MergeHistory>> {
        let mut result: Vec<MergeHistory> = read(&self.merges)?
            .values()
            .filter(|m| m.source_branch_id == branch_id || m.target_branch_id == branch_id)
            .cloned()
            .collect();
        result.sort_by_key(|m| std::cmp::Reverse(m.merged_at));
        Ok(result)
    }

    // === Effect Operations ===

    async fn effect_insert(&self, effect: &Effect) -> LoomResult<()> {
        let mut effects = write(&self.effects)?;
        if effects.contains_key(&effect.id) {
            return Err(StoreError::Duplicate {
                entity: "effect",
                id: effect.id.as_uuid(),
            }
            .into());
        }
        effects.insert(effect.id, effect.clone());
        Ok(())
    }

    async fn effect_get(&self, id: EffectId) -> LoomResult<Option<Effect>> {
        Ok(read(&self.effects)?.get(&id).cloned())
    }

    async fn effect_list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        active_only: bool,
    ) -> LoomResult<Vec<Effect>> {
        let mut result: Vec<Effect> = read(&self.effects)?
            .values()
            .filter(|e| {
                e.entity_type == entity_type
                    && e.entity_id == entity_id
                    && (!active_only || e.is_active)
            })
            .cloned()
            .collect();
        // Creation order is the stable tiebreak for priority ordering.
        result.sort_by_key(|e| (e.created_at, e.id));
        Ok(result)
    }

    async fn execution_insert(&self, execution: &EffectExecution) -> LoomResult<()> {
        let mut executions = write(&self.executions)?;
        if executions.contains_key(&execution.id) {
            return Err(StoreError::Duplicate {
                entity: "execution",
                id: execution.id.as_uuid(),
            }
            .into());
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn execution_list_for_effect(
        &self,
        effect_id: EffectId,
    ) -> LoomResult<Vec<EffectExecution>> {
        let mut result: Vec<EffectExecution> = read(&self.executions)?
            .values()
            .filter(|x| x.effect_id == effect_id)
            .cloned()
            .collect();
        result.sort_by_key(|x| (x.executed_at, x.id));
        Ok(result)
    }

    async fn execution_list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> LoomResult<Vec<EffectExecution>> {
        let mut result: Vec<EffectExecution> = read(&self.executions)?
            .values()
            .filter(|x| x.entity_type == entity_type && x.entity_id == entity_id)
            .cloned()
            .collect();
        result.sort_by_key(|x| (x.executed_at, x.id));
        Ok(result)
    }

    // === Entity Shell Operations ===

    async fn resolution_state_get(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> LoomResult<ResolutionState> {
        Ok(read(&self.resolution_flags)?
            .get(&(entity_type, entity_id))
            .copied()
            .unwrap_or_default())
    }

    async fn resolution_mark_resolved(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        at: Timestamp,
    ) -> LoomResult<()> {
        let mut flags = write(&self.resolution_flags)?;
        flags.insert(
            (entity_type, entity_id),
            ResolutionState {
                is_resolved: true,
                resolved_at: Some(at),
            },
        );
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_branch, make_version};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_branch_insert_get() {
        let store = MemoryTimelineStore::new();
        let branch = make_branch(CampaignId::now_v7(), "main");

        store.branch_insert(&branch).await.unwrap();
        let retrieved = store.branch_get(branch.id).await.unwrap();

        assert_eq!(retrieved, Some(branch));
    }

    #[tokio::test]
    async fn test_branch_insert_duplicate() {
        let store = MemoryTimelineStore::new();
        let branch = make_branch(CampaignId::now_v7(), "main");

        store.branch_insert(&branch).await.unwrap();
        let result = store.branch_insert(&branch).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_branch_find_by_name_scoped_to_campaign() {
        let store = MemoryTimelineStore::new();
        let campaign_a = CampaignId::now_v7();
        let campaign_b = CampaignId::now_v7();

        store
            .branch_insert(&make_branch(campaign_a, "main"))
            .await
            .unwrap();

        assert!(store
            .branch_find_by_name(campaign_a, "main")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .branch_find_by_name(campaign_b, "main")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_branch_delete_drops_owned_versions() {
        let store = MemoryTimelineStore::new();
        let branch = make_branch(CampaignId::now_v7(), "doomed");
        let other = make_branch(CampaignId::now_v7(), "kept");
        store.branch_insert(&branch).await.unwrap();
        store.branch_insert(&other).await.unwrap();

        let entity_id = EntityId::now_v7();
        store
            .version_insert(&make_version(
                EntityType::Settlement,
                entity_id,
                branch.id,
                Utc::now(),
            ))
            .await
            .unwrap();
        store
            .version_insert(&make_version(
                EntityType::Settlement,
                entity_id,
                other.id,
                Utc::now(),
            ))
            .await
            .unwrap();

        store.branch_delete(branch.id).await.unwrap();

        assert_eq!(store.version_count(), 1);
        assert!(store.branch_get(branch.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_find_open_ignores_closed() {
        let store = MemoryTimelineStore::new();
        let branch_id = BranchId::now_v7();
        let entity_id = EntityId::now_v7();
        let t0 = Utc::now();

        let mut closed = make_version(EntityType::Settlement, entity_id, branch_id, t0);
        closed.valid_to = Some(t0 + Duration::hours(1));
        let open = make_version(
            EntityType::Settlement,
            entity_id,
            branch_id,
            t0 + Duration::hours(1),
        );

        store.version_insert(&closed).await.unwrap();
        store.version_insert(&open).await.unwrap();

        let found = store
            .version_find_open(EntityType::Settlement, entity_id, branch_id)
            .await
            .unwrap();
        assert_eq!(found.map(|v| v.id), Some(open.id));
    }

    #[tokio::test]
    async fn test_version_close() {
        let store = MemoryTimelineStore::new();
        let version = make_version(
            EntityType::Kingdom,
            EntityId::now_v7(),
            BranchId::now_v7(),
            Utc::now(),
        );
        store.version_insert(&version).await.unwrap();

        let close_at = version.valid_from + Duration::days(1);
        store.version_close(version.id, close_at).await.unwrap();

        let stored = store.version_get(version.id).await.unwrap().unwrap();
        assert_eq!(stored.valid_to, Some(close_at));
    }

    #[tokio::test]
    async fn test_version_list_sorted_by_valid_from() {
        let store = MemoryTimelineStore::new();
        let branch_id = BranchId::now_v7();
        let entity_id = EntityId::now_v7();
        let t0 = Utc::now();

        for offset in [2i64, 0, 1] {
            store
                .version_insert(&make_version(
                    EntityType::Settlement,
                    entity_id,
                    branch_id,
                    t0 + Duration::hours(offset),
                ))
                .await
                .unwrap();
        }

        let versions = store
            .version_list_for_entity(EntityType::Settlement, entity_id, branch_id)
            .await
            .unwrap();
        let froms: Vec<WorldTime> = versions.iter().map(|v| v.valid_from).collect();
        assert_eq!(
            froms,
            vec![t0, t0 + Duration::hours(1), t0 + Duration::hours(2)]
        );
    }

    #[tokio::test]
    async fn test_entities_in_branches_dedupes() {
        let store = MemoryTimelineStore::new();
        let branch_a = BranchId::now_v7();
        let branch_b = BranchId::now_v7();
        let entity_id = EntityId::now_v7();
        let t0 = Utc::now();

        store
            .version_insert(&make_version(EntityType::Settlement, entity_id, branch_a, t0))
            .await
            .unwrap();
        store
            .version_insert(&make_version(EntityType::Settlement, entity_id, branch_b, t0))
            .await
            .unwrap();
        store
            .version_insert(&make_version(
                EntityType::Kingdom,
                EntityId::now_v7(),
                BranchId::now_v7(), // outside the queried set
                t0,
            ))
            .await
            .unwrap();

        let entities = store
            .version_entities_in_branches(&[branch_a, branch_b])
            .await
            .unwrap();
        assert_eq!(entities, vec![(EntityType::Settlement, entity_id)]);
    }

    #[tokio::test]
    async fn test_resolution_flags_default_and_mark() {
        let store = MemoryTimelineStore::new();
        let entity_id = EntityId::now_v7();

        let state = store
            .resolution_state_get(EntityType::Encounter, entity_id)
            .await
            .unwrap();
        assert!(!state.is_resolved);

        let at = Utc::now();
        store
            .resolution_mark_resolved(EntityType::Encounter, entity_id, at)
            .await
            .unwrap();

        let state = store
            .resolution_state_get(EntityType::Encounter, entity_id)
            .await
            .unwrap();
        assert!(state.is_resolved);
        assert_eq!(state.resolved_at, Some(at));
    }
}
