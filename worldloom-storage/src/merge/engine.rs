//! Merge engine: three-way merge, preview, cherry-pick, merge history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use worldloom_cache::CascadeInvalidator;
use worldloom_core::{
    AuditEntry, AuthenticatedUser, BranchId, ConflictResolution, EntityId, EntityType,
    LoomError, LoomResult, MergeConflict, MergeError, MergeHistory, MergeId, Version, VersionId,
    WorldTime,
};

use crate::branches::BranchTree;
use crate::collab::{topics, AuditSink, EventPublisher};
use crate::merge::diff::{compare_documents, set_path, DiffOptions, DiffOutcome};
use crate::resolver::VersionResolver;
use crate::store::TimelineStore;
use crate::versions::{NewVersion, VersionStore};

/// Parameters of an executed merge.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub source_branch_id: BranchId,
    pub target_branch_id: BranchId,
    pub common_ancestor_id: BranchId,
    pub world_time: WorldTime,
    pub resolutions: Vec<ConflictResolution>,
}

/// Result of a committed merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub versions_created: u32,
    pub merged_entity_ids: Vec<EntityId>,
    pub conflicts_count: u32,
    pub history: MergeHistory,
}

/// Result of a read-only merge preview.
#[derive(Debug, Clone)]
pub struct MergePreview {
    pub entities_compared: u32,
    pub conflicts: Vec<MergeConflict>,
}

/// Result of a cherry-pick attempt. Unresolved conflicts are surfaced here
/// rather than as an error so the caller can retry with resolutions.
#[derive(Debug, Clone)]
pub struct CherryPickOutcome {
    pub success: bool,
    pub version: Option<Version>,
    pub conflicts: Vec<MergeConflict>,
}

/// Array identity keys per entity type; everything else merges arrays by
/// index.
fn diff_options_for(entity_type: EntityType) -> DiffOptions {
    DiffOptions {
        array_identity_key: match entity_type {
            EntityType::Encounter => Some("id"),
            _ => None,
        },
    }
}

struct EntityComparison {
    entity_type: EntityType,
    entity_id: EntityId,
    source_version_id: Option<VersionId>,
    target_document: Option<serde_json::Value>,
    outcome: DiffOutcome,
}

/// Three-way merge between branches relative to a common ancestor.
pub struct MergeEngine {
    store: Arc<dyn TimelineStore>,
    branches: BranchTree,
    resolver: VersionResolver,
    versions: VersionStore,
    publisher: Option<Arc<dyn EventPublisher>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn TimelineStore>) -> Self {
        Self {
            branches: BranchTree::new(store.clone()),
            resolver: VersionResolver::new(store.clone()),
            versions: VersionStore::new(store.clone()),
            store,
            publisher: None,
            audit: None,
        }
    }

    pub fn with_cascade(mut self, cascade: Arc<CascadeInvalidator>) -> Self {
        self.versions = VersionStore::new(self.store.clone()).with_cascade(cascade);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The three versions a merge compares for one entity: resolved in the
    /// ancestor, the source, and the target, all at the merge world-time.
    pub async fn entity_versions_for_merge(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        source_branch_id: BranchId,
        target_branch_id: BranchId,
        ancestor_branch_id: BranchId,
        world_time: WorldTime,
    ) -> LoomResult<(Option<Version>, Option<Version>, Option<Version>)> {
        let base = self
            .resolver
            .resolve(entity_type, entity_id, ancestor_branch_id, world_time)
            .await?;
        let source = self
            .resolver
            .resolve(entity_type, entity_id, source_branch_id, world_time)
            .await?;
        let target = self
            .resolver
            .resolve(entity_type, entity_id, target_branch_id, world_time)
            .await?;
        Ok((base, source, target))
    }

    /// Read-only half of a merge: validate, enumerate, compare. Nothing is
    /// written, so callers can collect resolutions before executing.
    pub async fn preview(
        &self,
        source_branch_id: BranchId,
        target_branch_id: BranchId,
        common_ancestor_id: BranchId,
        world_time: WorldTime,
    ) -> LoomResult<MergePreview> {
        let comparisons = self
            .compare_all(
                source_branch_id,
                target_branch_id,
                common_ancestor_id,
                world_time,
            )
            .await?;

        let entities_compared = comparisons.len() as u32;
        let conflicts = comparisons
            .into_iter()
            .flat_map(|c| conflicts_of(&c))
            .collect();
        Ok(MergePreview {
            entities_compared,
            conflicts,
        })
    }

    /// Execute a merge.
    ///
    /// Every conflict must be covered by a supplied resolution, otherwise
    /// the merge aborts with `UnresolvedConflicts` before any write. On
    /// success one new version per changed entity lands on the target
    /// branch plus one merge history record.
    pub async fn execute(
        &self,
        request: MergeRequest,
        user: &AuthenticatedUser,
    ) -> LoomResult<MergeOutcome> {
        let mut comparisons = self
            .compare_all(
                request.source_branch_id,
                request.target_branch_id,
                request.common_ancestor_id,
                request.world_time,
            )
            .await?;

        // Match every conflict against the supplied resolutions; apply the
        // matched ones onto the merged documents, and abort if anything is
        // left over.
        let mut conflicts_count = 0u32;
        let mut unresolved = Vec::new();
        for comparison in &mut comparisons {
            let conflicts = conflicts_of(comparison);
            conflicts_count += conflicts.len() as u32;
            for conflict in conflicts {
                match request
                    .resolutions
                    .iter()
                    .find(|resolution| resolution.matches(&conflict))
                {
                    Some(resolution) => {
                        let merged = comparison
                            .outcome
                            .merged
                            .get_or_insert_with(|| serde_json::json!({}));
                        set_path(merged, &conflict.path, resolution.resolved_value.clone());
                    }
                    None => unresolved.push(conflict),
                }
            }
        }
        if !unresolved.is_empty() {
            return Err(MergeError::UnresolvedConflicts {
                conflicts: unresolved,
            }
            .into());
        }

        // Only entities whose merged document differs from the current
        // target document get a new version.
        let pending: Vec<&EntityComparison> = comparisons
            .iter()
            .filter(|c| c.outcome.merged.is_some() && c.outcome.merged != c.target_document)
            .collect();

        let mut versions_created = 0u32;
        let mut merged_entity_ids = Vec::new();
        for comparison in pending {
            let document = comparison
                .outcome
                .merged
                .clone()
                .expect("filtered to merged documents");
            self.versions
                .create(
                    NewVersion {
                        entity_type: comparison.entity_type,
                        entity_id: comparison.entity_id,
                        branch_id: request.target_branch_id,
                        valid_from: request.world_time,
                        valid_to: None,
                        document,
                        parent_version_id: comparison.source_version_id,
                    },
                    user,
                )
                .await?;
            versions_created += 1;
            merged_entity_ids.push(comparison.entity_id);
        }

        let history = MergeHistory {
            id: MergeId::now_v7(),
            source_branch_id: request.source_branch_id,
            target_branch_id: request.target_branch_id,
            common_ancestor_id: request.common_ancestor_id,
            merged_at: Utc::now(),
            merged_by: user.id,
            world_time: request.world_time,
            conflicts_count: conflicts_count as i32,
            entities_merged: versions_created as i32,
        };
        self.store.merge_history_insert(&history).await?;

        if let Some(publisher) = &self.publisher {
            publisher
                .publish(
                    &topics::branch_merged(request.target_branch_id),
                    serde_json::json!({
                        "sourceBranchId": request.source_branch_id,
                        "mergeId": history.id,
                        "entitiesMerged": versions_created,
                    }),
                )
                .await;
        }
        if let Some(audit) = &self.audit {
            audit
                .record(AuditEntry {
                    user_id: user.id,
                    action: "branch.merge".to_string(),
                    entity_type: None,
                    entity_id: Some(request.target_branch_id.as_uuid()),
                    before: None,
                    after: None,
                    at: Utc::now(),
                })
                .await;
        }
        info!(
            source = %request.source_branch_id,
            target = %request.target_branch_id,
            versions_created,
            conflicts_count,
            "merge committed"
        );

        Ok(MergeOutcome {
            versions_created,
            merged_entity_ids,
            conflicts_count,
            history,
        })
    }

    /// Apply a single named version's delta onto another branch.
    ///
    /// The base is the target's state at the picked version's `valid_from`,
    /// the target side is the target's current state. Unresolved conflicts
    /// return `success = false` with nothing written; a retry with matching
    /// resolutions succeeds.
    pub async fn cherry_pick(
        &self,
        version_id: VersionId,
        target_branch_id: BranchId,
        resolutions: &[ConflictResolution],
        user: &AuthenticatedUser,
    ) -> LoomResult<CherryPickOutcome> {
        let picked = self
            .store
            .version_get(version_id)
            .await?
            .ok_or_else(|| LoomError::not_found("version", version_id.as_uuid()))?;
        self.store
            .branch_get(target_branch_id)
            .await?
            .ok_or_else(|| LoomError::not_found("branch", target_branch_id.as_uuid()))?;

        let source_document = self.versions.decompress(&picked)?;
        let base_document = match self
            .resolver
            .resolve(
                picked.entity_type,
                picked.entity_id,
                target_branch_id,
                picked.valid_from,
            )
            .await?
        {
            Some(version) => Some(self.versions.decompress(&version)?),
            None => None,
        };
        let target_version = self
            .resolver
            .resolve(
                picked.entity_type,
                picked.entity_id,
                target_branch_id,
                DateTime::<Utc>::MAX_UTC,
            )
            .await?;
        let target_document = match &target_version {
            Some(version) => Some(self.versions.decompress(version)?),
            None => None,
        };

        let mut outcome = compare_documents(
            base_document.as_ref(),
            Some(&source_document),
            target_document.as_ref(),
            &diff_options_for(picked.entity_type),
        );

        let mut unresolved = Vec::new();
        for conflict in &outcome.conflicts {
            let conflict = MergeConflict {
                entity_type: picked.entity_type,
                entity_id: picked.entity_id,
                path: conflict.path.clone(),
                base_value: conflict.base_value.clone(),
                source_value: conflict.source_value.clone(),
                target_value: conflict.target_value.clone(),
            };
            match resolutions
                .iter()
                .find(|resolution| resolution.matches(&conflict))
            {
                Some(resolution) => {
                    let merged = outcome
                        .merged
                        .get_or_insert_with(|| serde_json::json!({}));
                    set_path(merged, &conflict.path, resolution.resolved_value.clone());
                }
                None => unresolved.push(conflict),
            }
        }
        if !unresolved.is_empty() {
            return Ok(CherryPickOutcome {
                success: false,
                version: None,
                conflicts: unresolved,
            });
        }

        let Some(document) = outcome.merged else {
            return Ok(CherryPickOutcome {
                success: true,
                version: None,
                conflicts: Vec::new(),
            });
        };

        // Land at the target's frontier: never before its open interval.
        let mut valid_from = picked.valid_from;
        if let Some(open) = &target_version {
            if open.is_open() && open.valid_from > valid_from {
                valid_from = open.valid_from;
            }
        }

        let version = self
            .versions
            .create(
                NewVersion {
                    entity_type: picked.entity_type,
                    entity_id: picked.entity_id,
                    branch_id: target_branch_id,
                    valid_from,
                    valid_to: None,
                    document,
                    parent_version_id: Some(version_id),
                },
                user,
            )
            .await?;

        Ok(CherryPickOutcome {
            success: true,
            version: Some(version),
            conflicts: Vec::new(),
        })
    }

    /// Merge history where the branch was source or target, newest first.
    pub async fn history_for_branch(&self, branch_id: BranchId) -> LoomResult<Vec<MergeHistory>> {
        self.store.merge_history_for_branch(branch_id).await
    }

    /// Validate the ancestor, enumerate candidate entities, and run the
    /// three-way compare for each.
    async fn compare_all(
        &self,
        source_branch_id: BranchId,
        target_branch_id: BranchId,
        common_ancestor_id: BranchId,
        world_time: WorldTime,
    ) -> LoomResult<Vec<EntityComparison>> {
        let source_chain = self.branches.ancestors(source_branch_id).await?;
        let target_chain = self.branches.ancestors(target_branch_id).await?;
        let is_ancestor_of_both = source_chain.iter().any(|b| b.id == common_ancestor_id)
            && target_chain.iter().any(|b| b.id == common_ancestor_id);
        if !is_ancestor_of_both {
            return Err(MergeError::InvalidAncestor {
                ancestor_id: common_ancestor_id,
                source_id: source_branch_id,
                target_id: target_branch_id,
            }
            .into());
        }

        let ancestor_chain = self.branches.ancestors(common_ancestor_id).await?;
        let mut branch_ids: Vec<BranchId> = Vec::new();
        for branch in source_chain
            .iter()
            .chain(target_chain.iter())
            .chain(ancestor_chain.iter())
        {
            if !branch_ids.contains(&branch.id) {
                branch_ids.push(branch.id);
            }
        }
        let entities = self.store.version_entities_in_branches(&branch_ids).await?;

        let mut comparisons = Vec::new();
        for (entity_type, entity_id) in entities {
            let (base, source, target) = self
                .entity_versions_for_merge(
                    entity_type,
                    entity_id,
                    source_branch_id,
                    target_branch_id,
                    common_ancestor_id,
                    world_time,
                )
                .await?;
            if base.is_none() && source.is_none() && target.is_none() {
                continue;
            }

            let base_document = match &base {
                Some(version) => Some(self.versions.decompress(version)?),
                None => None,
            };
            let source_document = match &source {
                Some(version) => Some(self.versions.decompress(version)?),
                None => None,
            };
            let target_document = match &target {
                Some(version) => Some(self.versions.decompress(version)?),
                None => None,
            };

            let outcome = compare_documents(
                base_document.as_ref(),
                source_document.as_ref(),
                target_document.as_ref(),
                &diff_options_for(entity_type),
            );
            comparisons.push(EntityComparison {
                entity_type,
                entity_id,
                source_version_id: source.map(|v| v.id),
                target_document,
                outcome,
            });
        }
        Ok(comparisons)
    }
}

fn conflicts_of(comparison: &EntityComparison) -> Vec<MergeConflict> {
    comparison
        .outcome
        .conflicts
        .iter()
        .map(|conflict| MergeConflict {
            entity_type: comparison.entity_type,
            entity_id: comparison.entity_id,
            path: conflict.path.clone(),
            base_value: conflict.base_value.clone(),
            source_value: conflict.source_value.clone(),
            target_value: conflict.target_value.clone(),
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::RecordingPublisher;
    use crate::fork::ForkEngine;
    use crate::store::MemoryTimelineStore;
    use crate::testutil::{make_branch, make_user};
    use chrono::TimeZone;
    use worldloom_core::{AuthenticatedUser, Branch, CampaignId, ErrorKind};

    struct Fixture {
        timeline: Arc<MemoryTimelineStore>,
        versions: VersionStore,
        resolver: VersionResolver,
        fork: ForkEngine,
        merge: MergeEngine,
        main: Branch,
        user: AuthenticatedUser,
    }

    async fn fixture() -> Fixture {
        let timeline = Arc::new(MemoryTimelineStore::new());
        let store = timeline.clone() as Arc<dyn TimelineStore>;
        let main = make_branch(CampaignId::now_v7(), "main");
        timeline.branch_insert(&main).await.unwrap();
        Fixture {
            timeline,
            versions: VersionStore::new(store.clone()),
            resolver: VersionResolver::new(store.clone()),
            fork: ForkEngine::new(store.clone()),
            merge: MergeEngine::new(store),
            main,
            user: make_user(),
        }
    }

    fn t(hour: u32) -> WorldTime {
        chrono::Utc.with_ymd_and_hms(1372, 6, 1, hour, 0, 0).unwrap()
    }

    async fn write(
        fx: &Fixture,
        branch_id: BranchId,
        entity_id: EntityId,
        valid_from: WorldTime,
        document: serde_json::Value,
    ) {
        fx.versions
            .create(
                NewVersion {
                    entity_type: EntityType::Settlement,
                    entity_id,
                    branch_id,
                    valid_from,
                    valid_to: None,
                    document,
                    parent_version_id: None,
                },
                &fx.user,
            )
            .await
            .unwrap();
    }

    async fn resolve_doc(
        fx: &Fixture,
        branch_id: BranchId,
        entity_id: EntityId,
        at: WorldTime,
    ) -> Option<serde_json::Value> {
        fx.resolver
            .resolve(EntityType::Settlement, entity_id, branch_id, at)
            .await
            .unwrap()
            .map(|v| fx.versions.decompress(&v).unwrap())
    }

    /// Base on main, fork two children, mutate both.
    async fn diverged_siblings(
        fx: &Fixture,
        entity_id: EntityId,
        base: serde_json::Value,
        source_doc: serde_json::Value,
        target_doc: serde_json::Value,
    ) -> (Branch, Branch) {
        write(fx, fx.main.id, entity_id, t(0), base).await;
        let source = fx
            .fork
            .fork(fx.main.id, "source", None, t(1), &fx.user)
            .await
            .unwrap()
            .branch;
        let target = fx
            .fork
            .fork(fx.main.id, "target", None, t(1), &fx.user)
            .await
            .unwrap()
            .branch;
        write(fx, source.id, entity_id, t(2), source_doc).await;
        write(fx, target.id, entity_id, t(2), target_doc).await;
        (source, target)
    }

    fn resolution(
        entity_id: EntityId,
        path: &str,
        value: serde_json::Value,
    ) -> ConflictResolution {
        ConflictResolution {
            entity_type: EntityType::Settlement,
            entity_id,
            path: path.to_string(),
            resolved_value: value,
        }
    }

    #[tokio::test]
    async fn test_auto_merge_of_disjoint_fields() {
        let fx = fixture().await;
        let entity_id = EntityId::now_v7();
        let (source, target) = diverged_siblings(
            &fx,
            entity_id,
            serde_json::json!({"population": 1000, "wealth": 500}),
            serde_json::json!({"population": 1500, "wealth": 500}),
            serde_json::json!({"population": 1000, "wealth": 600}),
        )
        .await;

        let outcome = fx
            .merge
            .execute(
                MergeRequest {
                    source_branch_id: source.id,
                    target_branch_id: target.id,
                    common_ancestor_id: fx.main.id,
                    world_time: t(5),
                    resolutions: Vec::new(),
                },
                &fx.user,
            )
            .await
            .unwrap();

        assert_eq!(outcome.conflicts_count, 0);
        assert_eq!(outcome.versions_created, 1);
        assert_eq!(
            resolve_doc(&fx, target.id, entity_id, t(6)).await,
            Some(serde_json::json!({"population": 1500, "wealth": 600}))
        );
    }

    #[tokio::test]
    async fn test_merge_with_resolutions_and_history() {
        let fx = fixture().await;
        let entity_id = EntityId::now_v7();
        let (source, target) = diverged_siblings(
            &fx,
            entity_id,
            serde_json::json!({"population": 1000, "wealth": 500}),
            serde_json::json!({"population": 1500, "wealth": 600}),
            serde_json::json!({"population": 1200, "wealth": 550}),
        )
        .await;

        // Preview first: both fields conflict.
        let preview = fx
            .merge
            .preview(source.id, target.id, fx.main.id, t(5))
            .await
            .unwrap();
        let mut paths: Vec<String> =
            preview.conflicts.iter().map(|c| c.path.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["population", "wealth"]);

        let outcome = fx
            .merge
            .execute(
                MergeRequest {
                    source_branch_id: source.id,
                    target_branch_id: target.id,
                    common_ancestor_id: fx.main.id,
                    world_time: t(5),
                    resolutions: vec![
                        resolution(entity_id, "population", serde_json::json!(1500)),
                        resolution(entity_id, "wealth", serde_json::json!(600)),
                    ],
                },
                &fx.user,
            )
            .await
            .unwrap();

        assert_eq!(outcome.conflicts_count, 2);
        assert_eq!(outcome.versions_created, 1);
        assert_eq!(outcome.merged_entity_ids, vec![entity_id]);
        assert_eq!(
            resolve_doc(&fx, target.id, entity_id, t(6)).await,
            Some(serde_json::json!({"population": 1500, "wealth": 600}))
        );

        let history = fx.merge.history_for_branch(target.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].conflicts_count, 2);
        assert!(history[0].entities_merged >= 1);
        assert_eq!(history[0].common_ancestor_id, fx.main.id);
    }

    #[tokio::test]
    async fn test_unresolved_conflicts_abort_without_writes() {
        let fx = fixture().await;
        let entity_id = EntityId::now_v7();
        let (source, target) = diverged_siblings(
            &fx,
            entity_id,
            serde_json::json!({"population": 1000}),
            serde_json::json!({"population": 1500}),
            serde_json::json!({"population": 1200}),
        )
        .await;

        let before_versions = fx.timeline.version_count();
        let result = fx
            .merge
            .execute(
                MergeRequest {
                    source_branch_id: source.id,
                    target_branch_id: target.id,
                    common_ancestor_id: fx.main.id,
                    world_time: t(5),
                    resolutions: Vec::new(),
                },
                &fx.user,
            )
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedConflicts);
        // No partial application: no versions, no history.
        assert_eq!(fx.timeline.version_count(), before_versions);
        assert_eq!(fx.timeline.merge_count(), 0);
        assert_eq!(
            resolve_doc(&fx, target.id, entity_id, t(6)).await,
            Some(serde_json::json!({"population": 1200}))
        );
    }

    #[tokio::test]
    async fn test_invalid_ancestor_is_rejected() {
        let fx = fixture().await;
        let entity_id = EntityId::now_v7();
        let (source, target) = diverged_siblings(
            &fx,
            entity_id,
            serde_json::json!({"population": 1000}),
            serde_json::json!({"population": 1500}),
            serde_json::json!({"population": 1200}),
        )
        .await;

        // A stranger branch in another tree is no common ancestor.
        let stranger = make_branch(CampaignId::now_v7(), "stranger");
        fx.timeline.branch_insert(&stranger).await.unwrap();

        let result = fx
            .merge
            .execute(
                MergeRequest {
                    source_branch_id: source.id,
                    target_branch_id: target.id,
                    common_ancestor_id: stranger.id,
                    world_time: t(5),
                    resolutions: Vec::new(),
                },
                &fx.user,
            )
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidAncestor);

        // A branch on only one side is rejected too.
        let result = fx
            .merge
            .execute(
                MergeRequest {
                    source_branch_id: source.id,
                    target_branch_id: target.id,
                    common_ancestor_id: source.id,
                    world_time: t(5),
                    resolutions: Vec::new(),
                },
                &fx.user,
            )
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidAncestor);
    }

    #[tokio::test]
    async fn test_merge_skips_unchanged_entities() {
        let fx = fixture().await;
        let changed = EntityId::now_v7();
        let untouched = EntityId::now_v7();

        write(&fx, fx.main.id, changed, t(0), serde_json::json!({"a": 1})).await;
        write(&fx, fx.main.id, untouched, t(0), serde_json::json!({"b": 1})).await;
        let source = fx
            .fork
            .fork(fx.main.id, "source", None, t(1), &fx.user)
            .await
            .unwrap()
            .branch;
        write(&fx, source.id, changed, t(2), serde_json::json!({"a": 2})).await;

        let outcome = fx
            .merge
            .execute(
                MergeRequest {
                    source_branch_id: source.id,
                    target_branch_id: fx.main.id,
                    common_ancestor_id: fx.main.id,
                    world_time: t(5),
                    resolutions: Vec::new(),
                },
                &fx.user,
            )
            .await
            .unwrap();

        assert_eq!(outcome.versions_created, 1);
        assert_eq!(outcome.merged_entity_ids, vec![changed]);
    }

    #[tokio::test]
    async fn test_merge_publishes_branch_merged() {
        let timeline = Arc::new(MemoryTimelineStore::new());
        let store = timeline.clone() as Arc<dyn TimelineStore>;
        let main = make_branch(CampaignId::now_v7(), "main");
        timeline.branch_insert(&main).await.unwrap();
        let publisher = RecordingPublisher::new();
        let merge = MergeEngine::new(store.clone()).with_publisher(publisher.clone());
        let fork = ForkEngine::new(store.clone());
        let versions = VersionStore::new(store);
        let user = make_user();

        let entity_id = EntityId::now_v7();
        versions
            .create(
                NewVersion {
                    entity_type: EntityType::Settlement,
                    entity_id,
                    branch_id: main.id,
                    valid_from: t(0),
                    valid_to: None,
                    document: serde_json::json!({"a": 1}),
                    parent_version_id: None,
                },
                &user,
            )
            .await
            .unwrap();
        let source = fork
            .fork(main.id, "source", None, t(1), &user)
            .await
            .unwrap()
            .branch;
        versions
            .create(
                NewVersion {
                    entity_type: EntityType::Settlement,
                    entity_id,
                    branch_id: source.id,
                    valid_from: t(2),
                    valid_to: None,
                    document: serde_json::json!({"a": 2}),
                    parent_version_id: None,
                },
                &user,
            )
            .await
            .unwrap();

        merge
            .execute(
                MergeRequest {
                    source_branch_id: source.id,
                    target_branch_id: main.id,
                    common_ancestor_id: main.id,
                    world_time: t(5),
                    resolutions: Vec::new(),
                },
                &user,
            )
            .await
            .unwrap();

        assert!(publisher
            .topics()
            .contains(&format!("branch.{}.merged", main.id)));
    }

    // ========================================================================
    // Cherry-pick
    // ========================================================================

    #[tokio::test]
    async fn test_cherry_pick_conflict_then_retry() {
        let fx = fixture().await;
        let entity_id = EntityId::now_v7();

        write(&fx, fx.main.id, entity_id, t(0), serde_json::json!({"population": 1000})).await;
        let branch_1 = fx
            .fork
            .fork(fx.main.id, "branch-1", None, t(1), &fx.user)
            .await
            .unwrap()
            .branch;
        let branch_2 = fx
            .fork
            .fork(fx.main.id, "branch-2", None, t(1), &fx.user)
            .await
            .unwrap()
            .branch;

        write(&fx, branch_1.id, entity_id, t(2), serde_json::json!({"population": 1500})).await;
        // Target diverges on the same field AFTER the picked version's
        // valid_from, so the pick sees base 1000, source 1500, target 1200.
        write(&fx, branch_2.id, entity_id, t(3), serde_json::json!({"population": 1200})).await;

        let picked = fx
            .resolver
            .resolve(EntityType::Settlement, entity_id, branch_1.id, t(3))
            .await
            .unwrap()
            .unwrap();

        // Without resolutions: conflict surfaced, nothing written.
        let before_versions = fx.timeline.version_count();
        let outcome = fx
            .merge
            .cherry_pick(picked.id, branch_2.id, &[], &fx.user)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].path, "population");
        assert_eq!(fx.timeline.version_count(), before_versions);

        // Retry with a resolution: applied.
        let outcome = fx
            .merge
            .cherry_pick(
                picked.id,
                branch_2.id,
                &[resolution(entity_id, "population", serde_json::json!(1500))],
                &fx.user,
            )
            .await
            .unwrap();
        assert!(outcome.success);
        let version = outcome.version.unwrap();
        assert_eq!(version.parent_version_id, Some(picked.id));
        assert_eq!(
            resolve_doc(&fx, branch_2.id, entity_id, t(9)).await,
            Some(serde_json::json!({"population": 1500}))
        );
    }

    #[tokio::test]
    async fn test_cherry_pick_without_divergence_applies_cleanly() {
        let fx = fixture().await;
        let entity_id = EntityId::now_v7();

        write(&fx, fx.main.id, entity_id, t(0), serde_json::json!({"population": 1000})).await;
        let branch_1 = fx
            .fork
            .fork(fx.main.id, "branch-1", None, t(1), &fx.user)
            .await
            .unwrap()
            .branch;
        let branch_2 = fx
            .fork
            .fork(fx.main.id, "branch-2", None, t(1), &fx.user)
            .await
            .unwrap()
            .branch;
        write(&fx, branch_1.id, entity_id, t(2), serde_json::json!({"population": 1500})).await;

        let picked = fx
            .resolver
            .resolve(EntityType::Settlement, entity_id, branch_1.id, t(3))
            .await
            .unwrap()
            .unwrap();

        let outcome = fx
            .merge
            .cherry_pick(picked.id, branch_2.id, &[], &fx.user)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(
            resolve_doc(&fx, branch_2.id, entity_id, t(9)).await,
            Some(serde_json::json!({"population": 1500}))
        );
    }

    #[tokio::test]
    async fn test_cherry_pick_unknown_version_is_not_found() {
        let fx = fixture().await;
        let result = fx
            .merge
            .cherry_pick(VersionId::now_v7(), fx.main.id, &[], &fx.user)
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }
}
