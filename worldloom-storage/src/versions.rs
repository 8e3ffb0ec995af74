//! Version store: interval bookkeeping over the timeline store.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use worldloom_cache::CascadeInvalidator;
use worldloom_core::{
    AuditEntry, AuthenticatedUser, BranchId, EntityId, EntityType, LoomError, LoomResult,
    Version, VersionError, VersionId, WorldTime,
};

use crate::collab::{topics, AuditSink, EventPublisher};
use crate::payload;
use crate::store::TimelineStore;

/// Optional world-time window for version listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<WorldTime>,
    pub to: Option<WorldTime>,
}

impl TimeWindow {
    /// Whether a version's `[valid_from, valid_to)` interval intersects the
    /// window.
    fn overlaps(&self, version: &Version) -> bool {
        let starts_in_time = match self.to {
            Some(to) => version.valid_from < to,
            None => true,
        };
        let ends_in_time = match (self.from, version.valid_to) {
            (Some(from), Some(valid_to)) => valid_to > from,
            _ => true,
        };
        starts_in_time && ends_in_time
    }
}

/// Parameters for appending a version.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub branch_id: BranchId,
    pub valid_from: WorldTime,
    /// Explicit close; `None` appends an open interval.
    pub valid_to: Option<WorldTime>,
    pub document: serde_json::Value,
    pub parent_version_id: Option<VersionId>,
}

/// Temporal payload store (bitemporal by way of `valid_*` world-times plus
/// `created_at` system-time).
///
/// Appending a version closes the currently open interval for the same
/// entity/branch, so the interval set stays pairwise disjoint with at most
/// one open interval.
pub struct VersionStore {
    store: Arc<dyn TimelineStore>,
    cascade: Option<Arc<CascadeInvalidator>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl VersionStore {
    pub fn new(store: Arc<dyn TimelineStore>) -> Self {
        Self {
            store,
            cascade: None,
            publisher: None,
            audit: None,
        }
    }

    pub fn with_cascade(mut self, cascade: Arc<CascadeInvalidator>) -> Self {
        self.cascade = Some(cascade);
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

    /// Append a version.
    ///
    /// When a version already exists at exactly the same `valid_from`, the
    /// open interval is replaced rather than closed into a zero-width
    /// interval.
    pub async fn create(&self, new: NewVersion, user: &AuthenticatedUser) -> LoomResult<Version> {
        if let Some(valid_to) = new.valid_to {
            if valid_to <= new.valid_from {
                return Err(VersionError::InvalidInterval {
                    valid_from: new.valid_from,
                    valid_to,
                }
                .into());
            }
        }

        let branch = self
            .store
            .branch_get(new.branch_id)
            .await?
            .ok_or_else(|| LoomError::not_found("branch", new.branch_id.as_uuid()))?;
        if let Some(diverged_at) = branch.diverged_at {
            if new.valid_from < diverged_at {
                return Err(VersionError::BeforeDivergence {
                    valid_from: new.valid_from,
                    diverged_at,
                }
                .into());
            }
        }

        if let Some(open) = self
            .store
            .version_find_open(new.entity_type, new.entity_id, new.branch_id)
            .await?
        {
            if open.valid_from == new.valid_from {
                // Same instant: replace the open interval in place.
                self.store.version_delete(open.id).await?;
            } else if open.valid_from < new.valid_from {
                self.store.version_close(open.id, new.valid_from).await?;
            } else {
                return Err(VersionError::OverlapsOpenInterval {
                    valid_from: new.valid_from,
                    open_from: open.valid_from,
                }
                .into());
            }
        }

        let version = Version {
            id: VersionId::now_v7(),
            entity_type: new.entity_type,
            entity_id: new.entity_id,
            branch_id: new.branch_id,
            valid_from: new.valid_from,
            valid_to: new.valid_to,
            payload: payload::encode(&new.document)?,
            created_at: Utc::now(),
            created_by: user.id,
            parent_version_id: new.parent_version_id,
        };
        self.store.version_insert(&version).await?;
        debug!(
            entity = %new.entity_id,
            branch = %new.branch_id,
            valid_from = %new.valid_from,
            "version appended"
        );

        if let Some(cascade) = &self.cascade {
            cascade
                .entity_changed(new.entity_type, new.entity_id, new.branch_id)
                .await;
        }
        if let Some(publisher) = &self.publisher {
            publisher
                .publish(
                    &topics::entity_changed(new.entity_type, new.entity_id),
                    serde_json::json!({
                        "branchId": new.branch_id,
                        "versionId": version.id,
                    }),
                )
                .await;
        }
        if let Some(audit) = &self.audit {
            audit
                .record(AuditEntry {
                    user_id: user.id,
                    action: "version.create".to_string(),
                    entity_type: Some(new.entity_type),
                    entity_id: Some(new.entity_id.as_uuid()),
                    before: None,
                    after: Some(new.document),
                    at: Utc::now(),
                })
                .await;
        }

        Ok(version)
    }

    /// Get a version by ID.
    pub async fn get(&self, id: VersionId) -> LoomResult<Option<Version>> {
        self.store.version_get(id).await
    }

    /// The stored document, decompressed when necessary.
    pub fn decompress(&self, version: &Version) -> LoomResult<serde_json::Value> {
        payload::decode(&version.payload)
    }

    /// Versions for an entity on a branch, sorted by `valid_from`,
    /// optionally restricted to a world-time window.
    pub async fn versions_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        branch_id: BranchId,
        window: Option<TimeWindow>,
    ) -> LoomResult<Vec<Version>> {
        let versions = self
            .store
            .version_list_for_entity(entity_type, entity_id, branch_id)
            .await?;
        Ok(match window {
            Some(window) => versions
                .into_iter()
                .filter(|v| window.overlaps(v))
                .collect(),
            None => versions,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::store::MemoryTimelineStore;
    use crate::testutil::{make_branch, make_user};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use worldloom_core::CampaignId;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Any append sequence leaves pairwise-disjoint intervals with at
        /// most one open interval.
        #[test]
        fn prop_intervals_stay_disjoint(hours in proptest::collection::vec(0u32..24, 1..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let timeline = Arc::new(MemoryTimelineStore::new());
                let branch = make_branch(CampaignId::now_v7(), "main");
                timeline.branch_insert(&branch).await.unwrap();
                let versions = VersionStore::new(timeline as Arc<dyn TimelineStore>);
                let user = make_user();
                let entity_id = EntityId::now_v7();

                for hour in hours {
                    let valid_from = chrono::Utc
                        .with_ymd_and_hms(1372, 6, 1, hour, 0, 0)
                        .unwrap();
                    let _ = versions
                        .create(
                            NewVersion {
                                entity_type: EntityType::Settlement,
                                entity_id,
                                branch_id: branch.id,
                                valid_from,
                                valid_to: None,
                                document: serde_json::json!({"hour": hour}),
                                parent_version_id: None,
                            },
                            &user,
                        )
                        .await;
                }

                let stored = versions
                    .versions_for_entity(EntityType::Settlement, entity_id, branch.id, None)
                    .await
                    .unwrap();
                let open_count = stored.iter().filter(|v| v.is_open()).count();
                prop_assert!(open_count <= 1);
                for pair in stored.windows(2) {
                    let end = pair[0]
                        .valid_to
                        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
                    prop_assert!(end <= pair[1].valid_from);
                }
                Ok(())
            })?;
        }
    }
}
