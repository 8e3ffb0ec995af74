//! Version records - immutable entity payloads over world-time intervals

use crate::{BranchId, EntityType, EntityId, Timestamp, UserId, VersionId, WorldTime};
use serde::{Deserialize, Serialize};

/// Version - an immutable record of an entity's payload over a half-open
/// world-time interval `[valid_from, valid_to)` on one branch.
///
/// For a fixed `(entity_type, entity_id, branch_id)` the stored intervals
/// are pairwise disjoint and at most one is open (`valid_to = None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub branch_id: BranchId,
    pub valid_from: WorldTime,
    /// `None` means the interval is open-ended.
    pub valid_to: Option<WorldTime>,
    pub payload: VersionPayload,
    pub created_at: Timestamp,
    pub created_by: UserId,
    /// The version this one logically supersedes, used for merge and
    /// cherry-pick lineage.
    pub parent_version_id: Option<VersionId>,
}

impl Version {
    /// Whether the interval is open-ended.
    pub fn is_open(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Whether the interval covers the given world-time instant.
    pub fn covers(&self, at: WorldTime) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |to| to > at)
    }
}

/// Stored representation of a version payload.
///
/// Compression is transparent at the version store boundary: callers hand in
/// and receive plain JSON documents, the store decides the representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
pub enum VersionPayload {
    /// Plain JSON document.
    Plain(serde_json::Value),
    /// Gzip-compressed JSON document bytes.
    Gzip(Vec<u8>),
}

impl VersionPayload {
    pub fn is_compressed(&self) -> bool {
        matches!(self, VersionPayload::Gzip(_))
    }
}
