//! Enum types for worldloom entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Entity type discriminator for versioned domain entities.
///
/// The wire names (lower case) appear as cache key segments and in pub/sub
/// topic names, so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Campaign,
    Kingdom,
    Settlement,
    Structure,
    Encounter,
    Event,
    Location,
}

impl EntityType {
    /// Every entity type, in declaration order.
    pub const ALL: [EntityType; 7] = [
        EntityType::Campaign,
        EntityType::Kingdom,
        EntityType::Settlement,
        EntityType::Structure,
        EntityType::Encounter,
        EntityType::Event,
        EntityType::Location,
    ];

    /// Stable lower-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Campaign => "campaign",
            EntityType::Kingdom => "kingdom",
            EntityType::Settlement => "settlement",
            EntityType::Structure => "structure",
            EntityType::Encounter => "encounter",
            EntityType::Event => "event",
            EntityType::Location => "location",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "campaign" => Ok(EntityType::Campaign),
            "kingdom" => Ok(EntityType::Kingdom),
            "settlement" => Ok(EntityType::Settlement),
            "structure" => Ok(EntityType::Structure),
            "encounter" => Ok(EntityType::Encounter),
            "event" => Ok(EntityType::Event),
            "location" => Ok(EntityType::Location),
            _ => Err(UnknownEntityType(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown entity type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityType(pub String);

impl fmt::Display for UnknownEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown entity type: {}", self.0)
    }
}

impl std::error::Error for UnknownEntityType {}

/// Timing phase of a declarative effect.
///
/// `Resolution` is a reserved phase; the three-phase workflow executes
/// `Pre`, `OnResolve`, `Post` in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectTiming {
    Pre,
    Resolution,
    OnResolve,
    Post,
}

impl EffectTiming {
    /// The phases executed by the three-phase resolution workflow, in order.
    pub const RESOLUTION_PHASES: [EffectTiming; 3] =
        [EffectTiming::Pre, EffectTiming::OnResolve, EffectTiming::Post];

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectTiming::Pre => "PRE",
            EffectTiming::Resolution => "RESOLUTION",
            EffectTiming::OnResolve => "ON_RESOLVE",
            EffectTiming::Post => "POST",
        }
    }
}

impl fmt::Display for EffectTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a declarative effect payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectType {
    /// A JSON-patch operation list applied to the entity payload.
    Patch,
}

/// JSON-patch operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Replace,
    Remove,
    Copy,
    Move,
    Test,
}

impl PatchOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOpKind::Add => "add",
            PatchOpKind::Replace => "replace",
            PatchOpKind::Remove => "remove",
            PatchOpKind::Copy => "copy",
            PatchOpKind::Move => "move",
            PatchOpKind::Test => "test",
        }
    }
}

impl fmt::Display for PatchOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_roundtrip() {
        for entity_type in EntityType::ALL {
            let parsed: EntityType = entity_type.as_str().parse().expect("known name");
            assert_eq!(parsed, entity_type);
        }
    }

    #[test]
    fn test_entity_type_unknown() {
        let result: Result<EntityType, _> = "spaceship".parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_entity_type_serde_wire_names() {
        let json = serde_json::to_string(&EntityType::Settlement).expect("serialize");
        assert_eq!(json, "\"settlement\"");
    }

    #[test]
    fn test_effect_timing_serde_wire_names() {
        let json = serde_json::to_string(&EffectTiming::OnResolve).expect("serialize");
        assert_eq!(json, "\"ON_RESOLVE\"");
    }

    #[test]
    fn test_resolution_phase_order() {
        assert_eq!(
            EffectTiming::RESOLUTION_PHASES,
            [EffectTiming::Pre, EffectTiming::OnResolve, EffectTiming::Post]
        );
    }
}
