//! Branch records for the timeline forest

use crate::{BranchId, CampaignId, Timestamp, UserId, WorldTime};
use serde::{Deserialize, Serialize};

/// Branch - a named line of history within a campaign.
///
/// Branches form a forest via `parent_id`: roots have neither a parent nor
/// a divergence point; every child carries the world-time at which it
/// diverged from its parent. Mutations an ancestor makes at or after that
/// divergence point are invisible to the child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<BranchId>,
    pub diverged_at: Option<WorldTime>,
    pub created_at: Timestamp,
    pub created_by: UserId,
}

impl Branch {
    /// Whether this branch is a root of its tree.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Structural invariant: `parent_id` is null iff `diverged_at` is null.
    pub fn is_well_formed(&self) -> bool {
        self.parent_id.is_some() == self.diverged_at.is_some()
    }
}

/// Parameters for creating a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBranch {
    pub campaign_id: CampaignId,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<BranchId>,
    pub diverged_at: Option<WorldTime>,
}
