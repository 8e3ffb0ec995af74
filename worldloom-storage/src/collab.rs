//! External collaborator traits: pub/sub, audit, campaign membership.
//!
//! The core never talks to a broker, an audit table, or an auth system
//! directly; it calls these traits. Recording implementations are provided
//! for tests and development.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use worldloom_core::{AuditEntry, AuthenticatedUser, BranchId, CampaignId, EntityId, EntityType};

/// Topic builders for the pub/sub collaborator.
pub mod topics {
    use super::*;

    pub fn entity_changed(entity_type: EntityType, entity_id: EntityId) -> String {
        format!("entity.{}.{}.changed", entity_type.as_str(), entity_id)
    }

    pub fn branch_forked(branch_id: BranchId) -> String {
        format!("branch.{}.forked", branch_id)
    }

    pub fn branch_merged(branch_id: BranchId) -> String {
        format!("branch.{}.merged", branch_id)
    }
}

/// Pub/sub transport. Notifications are emitted after the owning mutation
/// commits; delivery order across mutations is unspecified.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value);
}

/// Campaign membership collaborator. The core calls `can_edit` before every
/// mutation; a denial is reported to callers as not-found.
#[async_trait]
pub trait CampaignGate: Send + Sync {
    async fn can_edit(&self, user: &AuthenticatedUser, campaign_id: CampaignId) -> bool;
}

/// Audit log collaborator, called at every successful mutation commit.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

// ============================================================================
// TEST DOUBLES
// ============================================================================

/// Publisher that records every published message.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .map(|(topic, _)| topic)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: serde_json::Value) {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((topic.to_string(), payload));
    }
}

/// Audit sink that records every entry.
#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}

/// Gate that grants (or denies) everything; the default for tests.
pub struct OpenGate {
    allow: bool,
}

impl OpenGate {
    pub fn allow_all() -> Arc<Self> {
        Arc::new(Self { allow: true })
    }

    pub fn deny_all() -> Arc<Self> {
        Arc::new(Self { allow: false })
    }
}

#[async_trait]
impl CampaignGate for OpenGate {
    async fn can_edit(&self, _user: &AuthenticatedUser, _campaign_id: CampaignId) -> bool {
        self.allow
    }
}
