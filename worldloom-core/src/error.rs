//! Error types for worldloom operations

use crate::{
    BranchId, CampaignId, EntityId, EntityType, MergeConflict, PatchOpKind, WorldTime,
};
use thiserror::Error;
use uuid::Uuid;

/// Persistence layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Duplicate {entity}: {id}")]
    Duplicate { entity: &'static str, id: Uuid },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Write-write race on {entity} {id}: {reason}")]
    WriteConflict {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    #[error("Transient store failure: {reason}")]
    Transient { reason: String },

    #[error("Payload codec failure: {reason}")]
    Codec { reason: String },
}

/// Branch tree errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BranchError {
    #[error("Branch name '{name}' already used in campaign {campaign_id}")]
    NameTaken {
        campaign_id: CampaignId,
        name: String,
    },

    #[error("Branch {branch_id} would create a parent cycle")]
    CircularReference { branch_id: BranchId },

    #[error("Branch parent and divergence point must be set together: {reason}")]
    MalformedLineage { reason: String },

    #[error("Branch {branch_id} still has child branches")]
    HasChildren { branch_id: BranchId },
}

/// Version interval errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid interval: valid_to {valid_to} <= valid_from {valid_from}")]
    InvalidInterval {
        valid_from: WorldTime,
        valid_to: WorldTime,
    },

    #[error("valid_from {valid_from} is before branch divergence at {diverged_at}")]
    BeforeDivergence {
        valid_from: WorldTime,
        diverged_at: WorldTime,
    },

    #[error("valid_from {valid_from} precedes the open interval starting at {open_from}")]
    OverlapsOpenInterval {
        valid_from: WorldTime,
        open_from: WorldTime,
    },
}

/// Merge and cherry-pick errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MergeError {
    #[error("{ancestor_id} is not a common ancestor of {source_id} and {target_id}")]
    InvalidAncestor {
        ancestor_id: BranchId,
        source_id: BranchId,
        target_id: BranchId,
    },

    #[error("{} conflicts left unresolved", .conflicts.len())]
    UnresolvedConflicts { conflicts: Vec<MergeConflict> },
}

/// Effect validation and execution errors.
///
/// The executor records these on the EffectExecution row and keeps going;
/// they only cross the engine boundary for precondition failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EffectError {
    #[error("protected field: {path}")]
    ProtectedPath { path: String },

    #[error("Path {path} is outside the allowed prefixes for {entity_type}")]
    PathNotAllowed {
        entity_type: EntityType,
        path: String,
    },

    #[error("Path {path} does not exist in the target document")]
    PathNotFound { path: String },

    #[error("Operation {op} requires a {field} field")]
    MissingField { op: PatchOpKind, field: &'static str },

    #[error("Test failed at {path}")]
    TestFailed { path: String },

    #[error("{entity_type} {entity_id} is already resolved")]
    AlreadyResolved {
        entity_type: EntityType,
        entity_id: EntityId,
    },

    #[error("Effect dependency graph contains a cycle")]
    CyclicDependencies,

    #[error("Not implemented: {feature}")]
    NotImplemented { feature: &'static str },
}

/// Cache backend errors.
///
/// These never escape the cache store: every operation swallows them into
/// its return value. They exist so backends have something typed to log.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend failure: {reason}")]
    Backend { reason: String },

    #[error("Cache serialization failure: {reason}")]
    Serialization { reason: String },

    #[error("Malformed cache key: {key}")]
    MalformedKey { key: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all worldloom errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoomError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Branch error: {0}")]
    Branch(#[from] BranchError),

    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for worldloom operations.
pub type LoomResult<T> = Result<T, LoomError>;

// ============================================================================
// ERROR KIND
// ============================================================================

/// Wire-level error categorization surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    InvalidAncestor,
    UnresolvedConflicts,
    BeforeDivergence,
    Conflict,
    Transient,
    NotImplemented,
}

impl ErrorKind {
    /// Whether a caller may safely retry the operation.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl LoomError {
    /// Categorize for transports and retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoomError::Store(e) => match e {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::Duplicate { .. } => ErrorKind::Conflict,
                StoreError::WriteConflict { .. } => ErrorKind::Conflict,
                StoreError::LockPoisoned => ErrorKind::Transient,
                StoreError::Transient { .. } => ErrorKind::Transient,
                StoreError::Codec { .. } => ErrorKind::BadRequest,
            },
            LoomError::Branch(_) => ErrorKind::BadRequest,
            LoomError::Version(e) => match e {
                VersionError::InvalidInterval { .. } => ErrorKind::BadRequest,
                VersionError::BeforeDivergence { .. } => ErrorKind::BeforeDivergence,
                VersionError::OverlapsOpenInterval { .. } => ErrorKind::BadRequest,
            },
            LoomError::Merge(e) => match e {
                MergeError::InvalidAncestor { .. } => ErrorKind::InvalidAncestor,
                MergeError::UnresolvedConflicts { .. } => ErrorKind::UnresolvedConflicts,
            },
            LoomError::Effect(e) => match e {
                EffectError::NotImplemented { .. } => ErrorKind::NotImplemented,
                _ => ErrorKind::BadRequest,
            },
            LoomError::Cache(_) => ErrorKind::Transient,
            LoomError::Config(_) => ErrorKind::BadRequest,
        }
    }

    /// Convenience constructor for not-found results.
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        LoomError::Store(StoreError::NotFound { entity, id })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_kind_mapping() {
        let err = LoomError::not_found("branch", Uuid::nil());
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: LoomError = VersionError::BeforeDivergence {
            valid_from: Utc::now(),
            diverged_at: Utc::now(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::BeforeDivergence);

        let err: LoomError = MergeError::UnresolvedConflicts { conflicts: vec![] }.into();
        assert_eq!(err.kind(), ErrorKind::UnresolvedConflicts);

        let err: LoomError = EffectError::NotImplemented {
            feature: "executeEffectsWithDependencies",
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn test_only_transient_is_retriable() {
        assert!(ErrorKind::Transient.is_retriable());
        assert!(!ErrorKind::NotFound.is_retriable());
        assert!(!ErrorKind::Conflict.is_retriable());
        assert!(!ErrorKind::UnresolvedConflicts.is_retriable());
    }

    #[test]
    fn test_protected_path_message_names_protection() {
        let err = EffectError::ProtectedPath {
            path: "/id".to_string(),
        };
        assert!(err.to_string().contains("protected"));
    }

    #[test]
    fn test_invalid_ancestor_kind() {
        let err: LoomError = MergeError::InvalidAncestor {
            ancestor_id: BranchId::now_v7(),
            source_id: BranchId::now_v7(),
            target_id: BranchId::now_v7(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidAncestor);
    }
}
