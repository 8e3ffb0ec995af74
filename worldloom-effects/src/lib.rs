//! Worldloom Effects - Declarative Effect Execution
//!
//! Validates and applies JSON-patch effects against entity payloads with
//! protected-field enforcement, runs them in priority order through the
//! three-phase resolution workflow, and records one execution row per
//! attempted effect. Effect failures never abort a resolution; they are
//! recorded and execution continues.

pub mod deps;
pub mod executor;
pub mod patch;
pub mod resolution;

pub use executor::{execute_phase, order_effects, PhaseExecution};
pub use patch::{apply_ops, validate_ops};
pub use resolution::{ResolutionEngine, ResolutionOutcome, ResolveRequest};
