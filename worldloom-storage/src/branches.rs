//! Branch tree: creation, ancestry traversal, lowest common ancestor.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use worldloom_cache::CascadeInvalidator;
use worldloom_core::{
    AuthenticatedUser, Branch, BranchError, BranchId, CampaignId, LoomError, LoomResult,
    NewBranch,
};

use crate::store::TimelineStore;

/// Branch forest operations over a [`TimelineStore`].
pub struct BranchTree {
    store: Arc<dyn TimelineStore>,
    cascade: Option<Arc<CascadeInvalidator>>,
}

impl BranchTree {
    pub fn new(store: Arc<dyn TimelineStore>) -> Self {
        Self {
            store,
            cascade: None,
        }
    }

    /// Attach the cascade invalidator so branch deletion sweeps the cache.
    pub fn with_cascade(mut self, cascade: Arc<CascadeInvalidator>) -> Self {
        self.cascade = Some(cascade);
        self
    }

    /// Create a branch.
    ///
    /// Roots carry neither parent nor divergence point; children carry both.
    /// The candidate parent's ancestry is walked up front, which both
    /// validates the parent chain and guards against cycles.
    pub async fn create(&self, new: NewBranch, user: &AuthenticatedUser) -> LoomResult<Branch> {
        if new.parent_id.is_some() != new.diverged_at.is_some() {
            return Err(BranchError::MalformedLineage {
                reason: "parent_id and diverged_at must be set together".to_string(),
            }
            .into());
        }

        if self
            .store
            .branch_find_by_name(new.campaign_id, &new.name)
            .await?
            .is_some()
        {
            return Err(BranchError::NameTaken {
                campaign_id: new.campaign_id,
                name: new.name,
            }
            .into());
        }

        if let Some(parent_id) = new.parent_id {
            let parent = self
                .store
                .branch_get(parent_id)
                .await?
                .ok_or_else(|| LoomError::not_found("branch", parent_id.as_uuid()))?;
            if parent.campaign_id != new.campaign_id {
                return Err(BranchError::MalformedLineage {
                    reason: "parent belongs to a different campaign".to_string(),
                }
                .into());
            }
            // Walking to the root proves the parent chain is acyclic.
            self.ancestors(parent_id).await?;
        }

        let branch = Branch {
            id: BranchId::now_v7(),
            campaign_id: new.campaign_id,
            name: new.name,
            description: new.description,
            parent_id: new.parent_id,
            diverged_at: new.diverged_at,
            created_at: Utc::now(),
            created_by: user.id,
        };
        self.store.branch_insert(&branch).await?;
        Ok(branch)
    }

    /// Ancestry chain `[branch, parent, ..., root]`.
    ///
    /// Fails with `CircularReference` if the parent edges loop instead of
    /// reaching a root.
    pub async fn ancestors(&self, branch_id: BranchId) -> LoomResult<Vec<Branch>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(branch_id);

        while let Some(id) = current {
            if !visited.insert(id) {
                return Err(BranchError::CircularReference { branch_id: id }.into());
            }
            let branch = self
                .store
                .branch_get(id)
                .await?
                .ok_or_else(|| LoomError::not_found("branch", id.as_uuid()))?;
            current = branch.parent_id;
            chain.push(branch);
        }
        Ok(chain)
    }

    /// Lowest common ancestor of two branches.
    ///
    /// Walks A's ancestry into a hash set, then returns the first of B's
    /// ancestors present in it; `None` when the branches live in disjoint
    /// trees.
    pub async fn find_common_ancestor(
        &self,
        a: BranchId,
        b: BranchId,
    ) -> LoomResult<Option<Branch>> {
        let seen: HashSet<BranchId> = self
            .ancestors(a)
            .await?
            .into_iter()
            .map(|branch| branch.id)
            .collect();

        for candidate in self.ancestors(b).await? {
            if seen.contains(&candidate.id) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// All branches in a campaign.
    pub async fn list(&self, campaign_id: CampaignId) -> LoomResult<Vec<Branch>> {
        self.store.branch_list_by_campaign(campaign_id).await
    }

    /// Administratively delete a branch and every version it owns.
    ///
    /// Refused while the branch has live children; sweeps the branch's
    /// cache entries on success.
    pub async fn delete(&self, branch_id: BranchId) -> LoomResult<()> {
        let branch = self
            .store
            .branch_get(branch_id)
            .await?
            .ok_or_else(|| LoomError::not_found("branch", branch_id.as_uuid()))?;

        if !self.store.branch_children(branch_id).await?.is_empty() {
            return Err(BranchError::HasChildren { branch_id }.into());
        }

        self.store.branch_delete(branch_id).await?;
        if let Some(cascade) = &self.cascade {
            cascade.branch_deleted(branch_id).await;
        }
        info!(branch = %branch_id, name = %branch.name, "branch deleted");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTimelineStore;
    use crate::testutil::{make_user, make_version};
    use std::sync::Arc;
    use worldloom_cache::{CacheKey, CacheStore, InMemoryCacheStore};
    use worldloom_core::{EntityId, EntityType, ErrorKind};

    fn tree() -> (Arc<MemoryTimelineStore>, BranchTree) {
        let store = Arc::new(MemoryTimelineStore::new());
        let tree = BranchTree::new(store.clone() as Arc<dyn TimelineStore>);
        (store, tree)
    }

    async fn root(tree: &BranchTree, campaign_id: CampaignId, name: &str) -> Branch {
        tree.create(
            NewBranch {
                campaign_id,
                name: name.to_string(),
                description: None,
                parent_id: None,
                diverged_at: None,
            },
            &make_user(),
        )
        .await
        .unwrap()
    }

    async fn child(tree: &BranchTree, parent: &Branch, name: &str) -> Branch {
        tree.create(
            NewBranch {
                campaign_id: parent.campaign_id,
                name: name.to_string(),
                description: None,
                parent_id: Some(parent.id),
                diverged_at: Some(Utc::now()),
            },
            &make_user(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_root() {
        let (_, tree) = tree();
        let branch = root(&tree, CampaignId::now_v7(), "main").await;
        assert!(branch.is_root());
        assert!(branch.is_well_formed());
    }

    #[tokio::test]
    async fn test_create_rejects_half_lineage() {
        let (_, tree) = tree();
        let campaign_id = CampaignId::now_v7();
        let main = root(&tree, campaign_id, "main").await;

        let result = tree
            .create(
                NewBranch {
                    campaign_id,
                    name: "broken".to_string(),
                    description: None,
                    parent_id: Some(main.id),
                    diverged_at: None,
                },
                &make_user(),
            )
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name_in_campaign() {
        let (_, tree) = tree();
        let campaign_id = CampaignId::now_v7();
        root(&tree, campaign_id, "main").await;

        let result = tree
            .create(
                NewBranch {
                    campaign_id,
                    name: "main".to_string(),
                    description: None,
                    parent_id: None,
                    diverged_at: None,
                },
                &make_user(),
            )
            .await;
        assert!(result.is_err());

        // Same name in a different campaign is fine.
        root(&tree, CampaignId::now_v7(), "main").await;
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_parent() {
        let (_, tree) = tree();
        let result = tree
            .create(
                NewBranch {
                    campaign_id: CampaignId::now_v7(),
                    name: "orphan".to_string(),
                    description: None,
                    parent_id: Some(BranchId::now_v7()),
                    diverged_at: Some(Utc::now()),
                },
                &make_user(),
            )
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_ancestors_walks_to_root() {
        let (_, tree) = tree();
        let campaign_id = CampaignId::now_v7();
        let main = root(&tree, campaign_id, "main").await;
        let fork_a = child(&tree, &main, "what-if-a").await;
        let fork_b = child(&tree, &fork_a, "what-if-b").await;

        let chain = tree.ancestors(fork_b.id).await.unwrap();
        let ids: Vec<BranchId> = chain.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![fork_b.id, fork_a.id, main.id]);
    }

    #[tokio::test]
    async fn test_lca_of_siblings_is_parent() {
        let (_, tree) = tree();
        let campaign_id = CampaignId::now_v7();
        let main = root(&tree, campaign_id, "main").await;
        let left = child(&tree, &main, "left").await;
        let right = child(&tree, &main, "right").await;

        let lca = tree.find_common_ancestor(left.id, right.id).await.unwrap();
        assert_eq!(lca.map(|b| b.id), Some(main.id));
    }

    #[tokio::test]
    async fn test_lca_with_self_is_self() {
        let (_, tree) = tree();
        let main = root(&tree, CampaignId::now_v7(), "main").await;
        let left = child(&tree, &main, "left").await;

        let lca = tree.find_common_ancestor(left.id, main.id).await.unwrap();
        assert_eq!(lca.map(|b| b.id), Some(main.id));
    }

    #[tokio::test]
    async fn test_lca_of_disjoint_trees_is_none() {
        let (_, tree) = tree();
        let a = root(&tree, CampaignId::now_v7(), "main").await;
        let b = root(&tree, CampaignId::now_v7(), "main").await;

        let lca = tree.find_common_ancestor(a.id, b.id).await.unwrap();
        assert!(lca.is_none());
    }

    #[tokio::test]
    async fn test_delete_refuses_with_children() {
        let (_, tree) = tree();
        let main = root(&tree, CampaignId::now_v7(), "main").await;
        let leaf = child(&tree, &main, "leaf").await;

        let result = tree.delete(main.id).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::BadRequest);

        tree.delete(leaf.id).await.unwrap();
        tree.delete(main.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_sweeps_branch_cache() {
        let store = Arc::new(MemoryTimelineStore::new());
        let cache = Arc::new(InMemoryCacheStore::default());
        let cascade = Arc::new(CascadeInvalidator::new(
            cache.clone() as Arc<dyn CacheStore>
        ));
        let tree =
            BranchTree::new(store.clone() as Arc<dyn TimelineStore>).with_cascade(cascade);

        let main = root(&tree, CampaignId::now_v7(), "main").await;
        store
            .version_insert(&make_version(
                EntityType::Settlement,
                EntityId::now_v7(),
                main.id,
                Utc::now(),
            ))
            .await
            .unwrap();
        let key = CacheKey::entity(
            "entity",
            EntityType::Settlement,
            EntityId::now_v7(),
            main.id,
        );
        cache.set(&key, &serde_json::json!(1), None).await;

        tree.delete(main.id).await.unwrap();

        assert_eq!(store.version_count(), 0);
        assert!(cache.is_empty());
    }
}
