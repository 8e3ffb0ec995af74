//! Dependency-ordered effect execution (reserved).

use worldloom_core::{AuthenticatedUser, EffectError, EffectId, LoomResult};

use crate::resolution::ResolutionEngine;

impl ResolutionEngine {
    /// Reserved API: topologically sort effects by their read/write
    /// variable dependencies and execute them in dependency order,
    /// rejecting cyclic graphs.
    pub async fn execute_effects_with_dependencies(
        &self,
        _effect_ids: &[EffectId],
        _context: Option<serde_json::Value>,
        _user: &AuthenticatedUser,
    ) -> LoomResult<()> {
        Err(EffectError::NotImplemented {
            feature: "executeEffectsWithDependencies",
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use worldloom_core::{ErrorKind, UserId, UserRole};
    use worldloom_storage::{MemoryTimelineStore, OpenGate, TimelineStore};

    #[tokio::test]
    async fn test_reserved_api_raises_not_implemented() {
        let store = Arc::new(MemoryTimelineStore::new()) as Arc<dyn TimelineStore>;
        let engine = ResolutionEngine::new(store, OpenGate::allow_all());
        let user = AuthenticatedUser {
            id: UserId::now_v7(),
            email: "gm@example.com".to_string(),
            role: UserRole::GameMaster,
        };

        let result = engine
            .execute_effects_with_dependencies(&[EffectId::now_v7()], None, &user)
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotImplemented);
    }
}
