//! Audit log entry handed to the audit collaborator

use crate::{EntityType, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One audit record, written at every successful mutation commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: UserId,
    /// Verb, e.g. `version.create`, `branch.fork`, `branch.merge`.
    pub action: String,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    pub at: Timestamp,
}
