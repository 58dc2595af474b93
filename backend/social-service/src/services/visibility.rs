use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::domain::Account;
use crate::error::{AppError, AppResult};
use crate::repository::RelationshipStore;

/// Decides whether a viewer may see an owner's content.
///
/// 1. the viewer is the owner: visible
/// 2. the owner is public: visible
/// 3. otherwise visible iff the viewer follows the owner
///
/// Anonymous viewers never see private owners. The follow graph is only
/// consulted in step 3.
#[derive(Clone)]
pub struct VisibilityEngine {
    relationships: Arc<dyn RelationshipStore>,
}

impl VisibilityEngine {
    pub fn new(relationships: Arc<dyn RelationshipStore>) -> Self {
        Self { relationships }
    }

    /// Steps 1 and 2. `None` means the answer depends on the follow edge.
    fn decide_without_graph(viewer: Option<Uuid>, owner: &Account) -> Option<bool> {
        match viewer {
            Some(viewer_id) if viewer_id == owner.id => Some(true),
            _ if !owner.is_private => Some(true),
            None => Some(false),
            Some(_) => None,
        }
    }

    /// Batch form for callers that already hold the viewer's following set
    pub fn visible_with(viewer: Option<Uuid>, owner: &Account, following: &HashSet<Uuid>) -> bool {
        Self::decide_without_graph(viewer, owner).unwrap_or_else(|| following.contains(&owner.id))
    }

    pub async fn can_view(&self, viewer: Option<Uuid>, owner: &Account) -> AppResult<bool> {
        if let Some(decision) = Self::decide_without_graph(viewer, owner) {
            return Ok(decision);
        }
        match viewer {
            Some(viewer_id) => self.relationships.is_following(viewer_id, owner.id).await,
            None => Ok(false),
        }
    }

    pub async fn ensure_can_view(&self, viewer: Option<Uuid>, owner: &Account) -> AppResult<()> {
        if self.can_view(viewer, owner).await? {
            return Ok(());
        }
        debug!(viewer = ?viewer, owner = %owner.id, "Private account hidden from viewer");
        Err(AppError::forbidden("This account is private"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewAccount;
    use crate::repository::MockRelationshipStore;
    use chrono::Utc;

    fn owner(is_private: bool) -> Account {
        Account::new(
            NewAccount {
                username: "owner".into(),
                email: "owner@example.com".into(),
                full_name: "Owner".into(),
                is_private,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn public_owner_and_self_skip_the_graph() {
        let mut graph = MockRelationshipStore::new();
        graph.expect_is_following().times(0);
        let engine = VisibilityEngine::new(Arc::new(graph));

        let public = owner(false);
        assert!(engine.can_view(None, &public).await.unwrap());
        assert!(engine.can_view(Some(Uuid::new_v4()), &public).await.unwrap());

        let private = owner(true);
        assert!(engine.can_view(Some(private.id), &private).await.unwrap());
        assert!(!engine.can_view(None, &private).await.unwrap());
    }

    #[tokio::test]
    async fn private_owner_requires_follow_edge() {
        let private = owner(true);
        let follower = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let owner_id = private.id;

        let mut graph = MockRelationshipStore::new();
        graph
            .expect_is_following()
            .withf(move |viewer, followee| *followee == owner_id && *viewer == follower)
            .times(1)
            .returning(|_, _| Ok(true));
        graph
            .expect_is_following()
            .withf(move |viewer, _| *viewer == stranger)
            .times(1)
            .returning(|_, _| Ok(false));
        let engine = VisibilityEngine::new(Arc::new(graph));

        assert!(engine.can_view(Some(follower), &private).await.unwrap());
        let err = engine
            .ensure_can_view(Some(stranger), &private)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn batch_decision_uses_following_set() {
        let private = owner(true);
        let viewer = Uuid::new_v4();
        let mut following = HashSet::new();
        assert!(!VisibilityEngine::visible_with(Some(viewer), &private, &following));
        following.insert(private.id);
        assert!(VisibilityEngine::visible_with(Some(viewer), &private, &following));
        assert!(!VisibilityEngine::visible_with(None, &private, &following));
    }
}
