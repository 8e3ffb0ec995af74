//! Worldloom Storage - Temporal Branching and Versioning Core
//!
//! Defines the timeline store abstraction plus the engines built on it:
//! the version store (interval bookkeeping), branch tree (ancestry, LCA),
//! as-of resolver, fork engine, and three-way merge engine. The in-memory
//! store here is the reference implementation; a database implementation
//! provides the same trait with real transactions.

pub mod branches;
pub mod collab;
#[cfg(test)]
pub(crate) mod testutil;
pub mod fork;
pub mod merge;
pub mod payload;
pub mod resolver;
pub mod store;
pub mod versions;

pub use branches::BranchTree;
pub use collab::{
    topics, AuditSink, CampaignGate, EventPublisher, OpenGate, RecordingAudit,
    RecordingPublisher,
};
pub use fork::{ForkEngine, ForkOutcome};
pub use merge::{
    CherryPickOutcome, MergeEngine, MergeOutcome, MergePreview, MergeRequest,
};
pub use resolver::VersionResolver;
pub use store::{MemoryTimelineStore, TimelineStore};
pub use versions::{NewVersion, TimeWindow, VersionStore};
