//! Fork engine: snapshot-copy a branch's resolved state into a new child.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use worldloom_core::{
    AuditEntry, AuthenticatedUser, Branch, BranchId, LoomError, LoomResult, NewBranch,
    Version, VersionId, WorldTime,
};

use crate::branches::BranchTree;
use crate::collab::{topics, AuditSink, EventPublisher};
use crate::resolver::VersionResolver;
use crate::store::TimelineStore;

/// Result of a fork.
#[derive(Debug, Clone)]
pub struct ForkOutcome {
    pub branch: Branch,
    pub versions_copied: u32,
}

/// Forks a branch at a chosen world-time.
///
/// Every entity resolvable in the source at the fork time gets one snapshot
/// version in the child, opened at the fork time and linked back to the
/// source version it was copied from. Forking twice simply produces two
/// independent children.
pub struct ForkEngine {
    store: Arc<dyn TimelineStore>,
    branches: BranchTree,
    resolver: VersionResolver,
    publisher: Option<Arc<dyn EventPublisher>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl ForkEngine {
    pub fn new(store: Arc<dyn TimelineStore>) -> Self {
        Self {
            branches: BranchTree::new(store.clone()),
            resolver: VersionResolver::new(store.clone()),
            store,
            publisher: None,
            audit: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub async fn fork(
        &self,
        source_branch_id: BranchId,
        name: impl Into<String>,
        description: Option<String>,
        world_time: WorldTime,
        user: &AuthenticatedUser,
    ) -> LoomResult<ForkOutcome> {
        let source = self
            .store
            .branch_get(source_branch_id)
            .await?
            .ok_or_else(|| LoomError::not_found("branch", source_branch_id.as_uuid()))?;

        let child = self
            .branches
            .create(
                NewBranch {
                    campaign_id: source.campaign_id,
                    name: name.into(),
                    description,
                    parent_id: Some(source_branch_id),
                    diverged_at: Some(world_time),
                },
                user,
            )
            .await?;

        // Anything with a version anywhere on the source's ancestry chain
        // is a candidate; resolution decides what actually exists at the
        // fork time.
        let chain: Vec<BranchId> = self
            .branches
            .ancestors(source_branch_id)
            .await?
            .iter()
            .map(|branch| branch.id)
            .collect();
        let entities = self.store.version_entities_in_branches(&chain).await?;

        let mut versions_copied = 0u32;
        for (entity_type, entity_id) in entities {
            let Some(resolved) = self
                .resolver
                .resolve(entity_type, entity_id, source_branch_id, world_time)
                .await?
            else {
                continue;
            };

            let snapshot = Version {
                id: VersionId::now_v7(),
                entity_type,
                entity_id,
                branch_id: child.id,
                valid_from: world_time,
                valid_to: None,
                payload: resolved.payload.clone(),
                created_at: Utc::now(),
                created_by: user.id,
                parent_version_id: Some(resolved.id),
            };
            self.store.version_insert(&snapshot).await?;
            versions_copied += 1;
        }

        if let Some(publisher) = &self.publisher {
            publisher
                .publish(
                    &topics::branch_forked(child.id),
                    serde_json::json!({
                        "sourceBranchId": source_branch_id,
                        "worldTime": world_time,
                        "versionsCopied": versions_copied,
                    }),
                )
                .await;
        }
        if let Some(audit) = &self.audit {
            audit
                .record(AuditEntry {
                    user_id: user.id,
                    action: "branch.fork".to_string(),
                    entity_type: None,
                    entity_id: Some(child.id.as_uuid()),
                    before: None,
                    after: None,
                    at: Utc::now(),
                })
                .await;
        }
        info!(
            source = %source_branch_id,
            child = %child.id,
            versions_copied,
            "branch forked"
        );

        Ok(ForkOutcome {
            branch: child,
            versions_copied,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
