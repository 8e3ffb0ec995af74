//! Declarative effects and their execution records

use crate::{
    EffectId, EffectTiming, EffectType, EntityId, EntityType, ExecutionId, PatchOpKind, Timestamp,
    UserId,
};
use serde::{Deserialize, Serialize};

/// A single JSON-patch operation.
///
/// `value` is required for `add`/`replace`/`test`, `from` for `copy`/`move`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl PatchOp {
    pub fn add(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: PatchOpKind::Add,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: PatchOpKind::Replace,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOpKind::Remove,
            path: path.into(),
            value: None,
            from: None,
        }
    }
}

/// Effect - a declarative, validated patch applied to an entity payload
/// during a resolution workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub id: EffectId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub name: String,
    pub effect_type: EffectType,
    /// JSON-patch operation list.
    pub payload: Vec<PatchOp>,
    pub timing: EffectTiming,
    /// Ascending priority executes first within a phase.
    pub priority: i32,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub created_by: UserId,
    pub updated_at: Timestamp,
}

/// Result of applying a single effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Paths touched by the patch, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_fields: Option<Vec<String>>,
}

/// EffectExecution - append-only record of one attempted effect application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectExecution {
    pub id: ExecutionId,
    pub effect_id: EffectId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub executed_at: Timestamp,
    pub executed_by: UserId,
    /// Opaque caller-supplied context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    pub result: ExecutionResult,
    pub error: Option<String>,
}

/// Resolution flag carried on encounter/event shell rows.
///
/// Entity shells live outside the versioned payloads; this is the one piece
/// of shell state the resolution workflow reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolutionState {
    pub is_resolved: bool,
    pub resolved_at: Option<Timestamp>,
}

/// Per-phase totals for a resolution workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// Summary of a three-phase resolution, one entry per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EffectSummary {
    pub pre: PhaseSummary,
    pub on_resolve: PhaseSummary,
    pub post: PhaseSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_op_constructors() {
        let op = PatchOp::replace("/variables/defense", serde_json::json!(100));
        assert_eq!(op.op, PatchOpKind::Replace);
        assert_eq!(op.path, "/variables/defense");
        assert_eq!(op.value, Some(serde_json::json!(100)));

        let op = PatchOp::remove("/variables/defense");
        assert_eq!(op.op, PatchOpKind::Remove);
        assert!(op.value.is_none());
    }

    #[test]
    fn test_patch_op_wire_format() {
        let op = PatchOp::add("/variables/gold", serde_json::json!(1500));
        let json = serde_json::to_value(&op).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"op": "add", "path": "/variables/gold", "value": 1500})
        );
    }
}
