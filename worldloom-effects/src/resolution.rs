//! Three-phase encounter/event resolution workflow.
//!
//! PRE, ON_RESOLVE, POST run in order against one working copy of the
//! entity payload; the final copy is persisted as a single new version, the
//! shell row is marked resolved, and one execution record lands per
//! attempted effect. Preconditions run before any effect is even queried.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use worldloom_cache::CascadeInvalidator;
use worldloom_core::{
    AuditEntry, AuthenticatedUser, BranchId, CampaignId, EffectError, EffectSummary, EffectTiming,
    EntityId, EntityType, LoomError, LoomResult, ResolutionState, Version, WorldTime,
};
use worldloom_storage::{
    AuditSink, CampaignGate, EventPublisher, NewVersion, TimelineStore, VersionResolver,
    VersionStore,
};

use crate::executor::{execute_phase, order_effects, PhaseExecution};

/// Parameters of a resolution.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub campaign_id: CampaignId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub branch_id: BranchId,
    pub world_time: WorldTime,
    /// Opaque context copied onto every execution record.
    pub context: Option<serde_json::Value>,
}

/// Result of a resolution workflow.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    /// Final entity payload after all three phases.
    pub entity: serde_json::Value,
    /// The single version persisted for the workflow.
    pub version: Version,
    pub summary: EffectSummary,
    pub state: ResolutionState,
}

/// Drives the three-phase resolution workflow.
pub struct ResolutionEngine {
    store: Arc<dyn TimelineStore>,
    versions: VersionStore,
    resolver: VersionResolver,
    gate: Arc<dyn CampaignGate>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl ResolutionEngine {
    pub fn new(store: Arc<dyn TimelineStore>, gate: Arc<dyn CampaignGate>) -> Self {
        Self {
            versions: VersionStore::new(store.clone()),
            resolver: VersionResolver::new(store.clone()),
            store,
            gate,
            audit: None,
        }
    }

    pub fn with_cascade(mut self, cascade: Arc<CascadeInvalidator>) -> Self {
        self.versions = VersionStore::new(self.store.clone()).with_cascade(cascade);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.versions = self.versions.with_publisher(publisher);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Resolve an encounter or event.
    pub async fn resolve(
        &self,
        request: ResolveRequest,
        user: &AuthenticatedUser,
    ) -> LoomResult<ResolutionOutcome> {
        // Access is checked before anything else; a denial reads as
        // not-found so callers cannot probe for existence.
        if !self.gate.can_edit(user, request.campaign_id).await {
            return Err(LoomError::not_found(
                "campaign",
                request.campaign_id.as_uuid(),
            ));
        }
        let state = self
            .store
            .resolution_state_get(request.entity_type, request.entity_id)
            .await?;
        if state.is_resolved {
            return Err(EffectError::AlreadyResolved {
                entity_type: request.entity_type,
                entity_id: request.entity_id,
            }
            .into());
        }

        let current = self
            .resolver
            .resolve(
                request.entity_type,
                request.entity_id,
                request.branch_id,
                request.world_time,
            )
            .await?
            .ok_or_else(|| {
                LoomError::not_found(request.entity_type.as_str(), request.entity_id.as_uuid())
            })?;
        let mut working = self.versions.decompress(&current)?;

        let mut effects = self
            .store
            .effect_list_for_entity(request.entity_type, request.entity_id, true)
            .await?;
        order_effects(&mut effects);

        let mut summary = EffectSummary::default();
        let mut records = Vec::new();
        for phase in EffectTiming::RESOLUTION_PHASES {
            let phase_effects: Vec<_> = effects
                .iter()
                .filter(|e| e.timing == phase)
                .cloned()
                .collect();
            let PhaseExecution {
                summary: phase_summary,
                records: phase_records,
            } = execute_phase(&mut working, &phase_effects, user, request.context.as_ref());

            match phase {
                EffectTiming::Pre => summary.pre = phase_summary,
                EffectTiming::OnResolve => summary.on_resolve = phase_summary,
                EffectTiming::Post => summary.post = phase_summary,
                EffectTiming::Resolution => {}
            }
            records.extend(phase_records);
        }

        // Persist the final working copy exactly once, then flip the shell
        // flag and append the execution rows.
        let version = self
            .versions
            .create(
                NewVersion {
                    entity_type: request.entity_type,
                    entity_id: request.entity_id,
                    branch_id: request.branch_id,
                    valid_from: request.world_time,
                    valid_to: None,
                    document: working.clone(),
                    parent_version_id: Some(current.id),
                },
                user,
            )
            .await?;

        let resolved_at = Utc::now();
        self.store
            .resolution_mark_resolved(request.entity_type, request.entity_id, resolved_at)
            .await?;
        for record in &records {
            self.store.execution_insert(record).await?;
        }

        if let Some(audit) = &self.audit {
            audit
                .record(AuditEntry {
                    user_id: user.id,
                    action: format!("{}.resolve", request.entity_type.as_str()),
                    entity_type: Some(request.entity_type),
                    entity_id: Some(request.entity_id.as_uuid()),
                    before: None,
                    after: Some(working.clone()),
                    at: resolved_at,
                })
                .await;
        }
        info!(
            entity = %request.entity_id,
            branch = %request.branch_id,
            attempted = records.len(),
            "resolution completed"
        );

        Ok(ResolutionOutcome {
            entity: working,
            version,
            summary,
            state: ResolutionState {
                is_resolved: true,
                resolved_at: Some(resolved_at),
            },
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
