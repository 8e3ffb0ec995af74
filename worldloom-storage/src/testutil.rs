//! Shared test fixtures for the storage engines.

use chrono::Utc;
use worldloom_core::{
    AuthenticatedUser, Branch, BranchId, CampaignId, Effect, EffectId, EffectTiming, EffectType,
    EntityId, EntityType, PatchOp, Timestamp, UserId, UserRole, Version, VersionId,
    VersionPayload, WorldTime,
};

pub(crate) fn make_user() -> AuthenticatedUser {
    AuthenticatedUser {
        id: UserId::now_v7(),
        email: "gm@example.com".to_string(),
        role: UserRole::GameMaster,
    }
}

pub(crate) fn make_branch(campaign_id: CampaignId, name: &str) -> Branch {
    Branch {
        id: BranchId::now_v7(),
        campaign_id,
        name: name.to_string(),
        description: None,
        parent_id: None,
        diverged_at: None,
        created_at: Utc::now(),
        created_by: UserId::now_v7(),
    }
}

pub(crate) fn make_version(
    entity_type: EntityType,
    entity_id: EntityId,
    branch_id: BranchId,
    valid_from: WorldTime,
) -> Version {
    Version {
        id: VersionId::now_v7(),
        entity_type,
        entity_id,
        branch_id,
        valid_from,
        valid_to: None,
        payload: VersionPayload::Plain(serde_json::json!({"stage": "initial"})),
        created_at: Utc::now(),
        created_by: UserId::now_v7(),
        parent_version_id: None,
    }
}

pub(crate) fn make_effect(
    entity_type: EntityType,
    entity_id: EntityId,
    timing: EffectTiming,
    priority: i32,
    ops: Vec<PatchOp>,
    created_at: Timestamp,
) -> Effect {
    Effect {
        id: EffectId::now_v7(),
        entity_type,
        entity_id,
        name: format!("effect-{}", priority),
        effect_type: EffectType::Patch,
        payload: ops,
        timing,
        priority,
        is_active: true,
        created_at,
        created_by: UserId::now_v7(),
        updated_at: created_at,
    }
}
