//! Merge records: conflicts, resolutions, history

use crate::{BranchId, EntityId, EntityType, MergeId, Timestamp, UserId, WorldTime};
use serde::{Deserialize, Serialize};

/// A conflicting path detected by a three-way compare.
///
/// `path` is dotted and fully qualified (e.g. `config.trade.routes.north.value`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub path: String,
    pub base_value: Option<serde_json::Value>,
    pub source_value: Option<serde_json::Value>,
    pub target_value: Option<serde_json::Value>,
}

/// A caller-supplied resolution for one conflicting path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub path: String,
    pub resolved_value: serde_json::Value,
}

impl ConflictResolution {
    /// Whether this resolution settles the given conflict.
    pub fn matches(&self, conflict: &MergeConflict) -> bool {
        self.entity_type == conflict.entity_type
            && self.entity_id == conflict.entity_id
            && self.path == conflict.path
    }
}

/// MergeHistory - one record per executed merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeHistory {
    pub id: MergeId,
    pub source_branch_id: BranchId,
    pub target_branch_id: BranchId,
    pub common_ancestor_id: BranchId,
    pub merged_at: Timestamp,
    pub merged_by: UserId,
    pub world_time: WorldTime,
    pub conflicts_count: i32,
    pub entities_merged: i32,
}
