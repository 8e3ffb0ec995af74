//! Hierarchical branch-scoped cache key scheme.
//!
//! A key is the colon-joined tuple
//! `prefix : [entityType] : [entityId] : *segments : branchId`.
//! The branch ID is ALWAYS the last segment, which is what makes
//! `*:{branchId}` bulk invalidation of a whole branch possible.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;
use worldloom_core::{BranchId, CacheError, EntityId, EntityType};

/// Key separator. Every segment must be non-empty and free of this byte.
const SEPARATOR: char = ':';

/// Well-known cache key prefixes.
pub mod prefixes {
    /// Expensive derived fields computed per entity.
    pub const COMPUTED_FIELDS: &str = "computed-fields";
    /// Structure listings keyed by owning settlement.
    pub const STRUCTURES: &str = "structures";
    /// Spatial query results from the PostGIS collaborator.
    pub const SPATIAL: &str = "spatial";
    /// Raw resolved entity payloads.
    pub const ENTITY: &str = "entity";
}

/// A parsed, well-formed cache key.
///
/// Construction goes through [`CacheKey::entity`] / [`CacheKey::scoped`], so
/// a key always carries its branch suffix; there is no way to build one that
/// escapes branch-scoped invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    prefix: String,
    entity: Option<(EntityType, EntityId)>,
    segments: Vec<String>,
    branch_id: BranchId,
}

impl CacheKey {
    /// Key for a single entity: `{prefix}:{type}:{id}:{branch}`.
    pub fn entity(
        prefix: impl Into<String>,
        entity_type: EntityType,
        entity_id: EntityId,
        branch_id: BranchId,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            entity: Some((entity_type, entity_id)),
            segments: Vec::new(),
            branch_id,
        }
    }

    /// Key without an entity component: `{prefix}:{branch}`.
    ///
    /// When the entity type is absent the entity ID is dropped with it.
    pub fn scoped(prefix: impl Into<String>, branch_id: BranchId) -> Self {
        Self {
            prefix: prefix.into(),
            entity: None,
            segments: Vec::new(),
            branch_id,
        }
    }

    /// Append an additional opaque segment before the branch suffix.
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn entity_type(&self) -> Option<EntityType> {
        self.entity.map(|(t, _)| t)
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        self.entity.map(|(_, id)| id)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    /// Render to the wire form.
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4 + self.segments.len());
        parts.push(self.prefix.clone());
        if let Some((entity_type, entity_id)) = &self.entity {
            parts.push(entity_type.as_str().to_string());
            parts.push(entity_id.to_string());
        }
        parts.extend(self.segments.iter().cloned());
        parts.push(self.branch_id.to_string());
        parts.join(":")
    }

    /// Parse a wire-form key.
    ///
    /// The first segment is the prefix, the last is the branch; middle
    /// segments are opaque, except that a leading `(entityType, uuid)` pair
    /// is recognized and promoted to the typed entity component. Rejects
    /// keys with fewer than two segments, any empty segment, or a
    /// non-UUID branch suffix.
    pub fn parse(raw: &str) -> Result<Self, CacheError> {
        let malformed = || CacheError::MalformedKey {
            key: raw.to_string(),
        };

        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(malformed());
        }

        let prefix = parts[0].to_string();
        let branch_id = Uuid::from_str(parts[parts.len() - 1])
            .map(BranchId::from_uuid)
            .map_err(|_| malformed())?;
        let mut middle = &parts[1..parts.len() - 1];

        let entity = if middle.len() >= 2 {
            match (
                middle[0].parse::<EntityType>(),
                Uuid::from_str(middle[1]),
            ) {
                (Ok(entity_type), Ok(uuid)) => {
                    middle = &middle[2..];
                    Some((entity_type, EntityId::from_uuid(uuid)))
                }
                _ => None,
            }
        } else {
            None
        };

        Ok(Self {
            prefix,
            entity,
            segments: middle.iter().map(|s| s.to_string()).collect(),
            branch_id,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ============================================================================
// PATTERN BUILDERS
// ============================================================================

/// Wildcard pattern builders for bulk invalidation (Redis glob semantics).
pub mod patterns {
    use super::*;

    /// Every key under a prefix: `{prefix}:*`.
    pub fn prefix(prefix: &str) -> String {
        format!("{}{}*", prefix, SEPARATOR)
    }

    /// Every prefix's key for one entity on one branch: `*:{type}:{id}:{branch}`.
    pub fn entity(entity_type: EntityType, entity_id: EntityId, branch_id: BranchId) -> String {
        format!(
            "*{sep}{}{sep}{}{sep}{}",
            entity_type.as_str(),
            entity_id,
            branch_id,
            sep = SEPARATOR
        )
    }

    /// Every key belonging to one branch: `*:{branch}`.
    pub fn branch(branch_id: BranchId) -> String {
        format!("*{}{}", SEPARATOR, branch_id)
    }

    /// One prefix's keys for every entity of a type on one branch:
    /// `{prefix}:{type}:*:{branch}`.
    pub fn typed_in_branch(prefix: &str, entity_type: EntityType, branch_id: BranchId) -> String {
        format!(
            "{}{sep}{}{sep}*{sep}{}",
            prefix,
            entity_type.as_str(),
            branch_id,
            sep = SEPARATOR
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
