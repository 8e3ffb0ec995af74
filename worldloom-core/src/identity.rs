//! Identity types for worldloom records.
//!
//! Every record family shares one generic [`Id`] newtype over UUID,
//! parameterized by an uninhabited kind marker. Two IDs of different kinds
//! are different types, so a branch ID can never be handed to an API that
//! wants a version ID, without a macro per family.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Kind marker for an ID family.
///
/// Implemented by the uninhabited types in [`kind`]; `LABEL` shows up in
/// debug output and parse errors.
pub trait IdKind {
    const LABEL: &'static str;
}

/// A UUID scoped to one record family.
///
/// The marker only exists at the type level (`PhantomData<fn() -> K>`), so
/// an `Id` is still a plain 16-byte value: `Copy`, ordered, hashable, and
/// serialized as the bare UUID string.
pub struct Id<K>(Uuid, PhantomData<fn() -> K>);

impl<K> Id<K> {
    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    /// The nil (all zeros) ID.
    pub const fn nil() -> Self {
        Self::from_uuid(Uuid::nil())
    }

    /// Mint a timestamp-sortable UUIDv7 ID.
    pub fn now_v7() -> Self {
        Self::from_uuid(Uuid::now_v7())
    }

    /// The underlying UUID.
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

// Manual impls: derives would demand bounds on `K`, which is never held.

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Id<K> {}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K> Eq for Id<K> {}

impl<K> PartialOrd for Id<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Id<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<K> Default for Id<K> {
    fn default() -> Self {
        Self::nil()
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<K: IdKind> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", K::LABEL, self.0)
    }
}

impl<K: IdKind> FromStr for Id<K> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self::from_uuid)
            .map_err(|source| ParseIdError {
                label: K::LABEL,
                source,
            })
    }
}

impl<K> Serialize for Id<K> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, K> Deserialize<'de> for Id<K> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

/// A string that was not a UUID of the expected kind.
#[derive(Debug, Clone, Error)]
#[error("invalid {label} id: {source}")]
pub struct ParseIdError {
    pub label: &'static str,
    pub source: uuid::Error,
}

// ============================================================================
// ID FAMILIES
// ============================================================================

/// Uninhabited kind markers, one per record family.
pub mod kind {
    pub enum Campaign {}
    pub enum Branch {}
    pub enum Version {}
    pub enum Entity {}
    pub enum Effect {}
    pub enum Execution {}
    pub enum Merge {}
    pub enum User {}
}

macro_rules! id_labels {
    ($($marker:ident => $label:literal),+ $(,)?) => {
        $(impl IdKind for kind::$marker {
            const LABEL: &'static str = $label;
        })+
    };
}

id_labels! {
    Campaign => "campaign",
    Branch => "branch",
    Version => "version",
    Entity => "entity",
    Effect => "effect",
    Execution => "execution",
    Merge => "merge",
    User => "user",
}

/// ID of a campaign.
pub type CampaignId = Id<kind::Campaign>;
/// ID of a timeline branch.
pub type BranchId = Id<kind::Branch>;
/// ID of an entity version.
pub type VersionId = Id<kind::Version>;
/// ID of a versioned domain entity (kingdom, settlement, encounter, ...).
pub type EntityId = Id<kind::Entity>;
/// ID of a declarative effect.
pub type EffectId = Id<kind::Effect>;
/// ID of an effect execution record.
pub type ExecutionId = Id<kind::Execution>;
/// ID of a merge history record.
pub type MergeId = Id<kind::Merge>;
/// ID of a user.
pub type UserId = Id<kind::User>;

// ============================================================================
// TIME
// ============================================================================

/// System-time (wall-clock audit time) instant, UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// World-time instant, UTC. In-universe time the user models; the only
/// time dimension that affects resolution semantics.
pub type WorldTime = chrono::DateTime<chrono::Utc>;

// ============================================================================
// TESTS
// ============================================================================
