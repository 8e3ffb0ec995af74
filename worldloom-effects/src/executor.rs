//! Priority-ordered effect execution against a working copy.

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use worldloom_core::{
    AuthenticatedUser, Effect, EffectExecution, ExecutionId, ExecutionResult, PhaseSummary,
};

use crate::patch::{apply_ops, validate_ops};

/// Outcome of one executed phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseExecution {
    pub summary: PhaseSummary,
    pub records: Vec<EffectExecution>,
}

/// Order effects for execution: ascending priority, then stable creation
/// order.
pub fn order_effects(effects: &mut [Effect]) {
    effects.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// Execute one phase's effects against the working copy.
///
/// Each effect applies to a scratch copy that is committed only on success,
/// so a failed effect leaves the working copy untouched and later effects
/// still run against the pre-failure state. One execution record is
/// produced per attempted effect; failures never propagate as errors.
pub fn execute_phase(
    working: &mut Value,
    effects: &[Effect],
    user: &AuthenticatedUser,
    context: Option<&Value>,
) -> PhaseExecution {
    let mut execution = PhaseExecution::default();

    for effect in effects {
        execution.summary.total += 1;

        let attempt = validate_ops(effect.entity_type, &effect.payload).and_then(|()| {
            let mut scratch = working.clone();
            let affected = apply_ops(&mut scratch, &effect.payload)?;
            Ok((scratch, affected))
        });

        let (result, error) = match attempt {
            Ok((scratch, affected)) => {
                *working = scratch;
                execution.summary.succeeded += 1;
                (
                    ExecutionResult {
                        success: true,
                        affected_fields: Some(affected),
                    },
                    None,
                )
            }
            Err(err) => {
                execution.summary.failed += 1;
                debug!(effect = %effect.id, error = %err, "effect failed");
                (
                    ExecutionResult {
                        success: false,
                        affected_fields: None,
                    },
                    Some(err.to_string()),
                )
            }
        };

        execution.records.push(EffectExecution {
            id: ExecutionId::now_v7(),
            effect_id: effect.id,
            entity_type: effect.entity_type,
            entity_id: effect.entity_id,
            executed_at: Utc::now(),
            executed_by: user.id,
            context: context.cloned(),
            result,
            error,
        });
    }

    execution
}

// ============================================================================
// TESTS
// ============================================================================
