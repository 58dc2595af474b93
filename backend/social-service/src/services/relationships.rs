use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Account, AccountSummary, FollowCounts};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::repository::{AccountStore, RelationshipStore, Stores};

/// Follow/unfollow and the derived follower/following views
#[derive(Clone)]
pub struct RelationshipService {
    accounts: Arc<dyn AccountStore>,
    relationships: Arc<dyn RelationshipStore>,
}

impl RelationshipService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            accounts: stores.accounts.clone(),
            relationships: stores.relationships.clone(),
        }
    }

    async fn require_account(&self, id: Uuid) -> AppResult<Account> {
        self.accounts
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<()> {
        if follower_id == followee_id {
            return Err(AppError::SelfFollow);
        }
        self.require_account(followee_id).await?;

        let created = self
            .relationships
            .insert_follow(follower_id, followee_id, Utc::now())
            .await?;
        if !created {
            metrics::record_interaction("follow", "duplicate");
            return Err(AppError::AlreadyFollowing);
        }

        metrics::record_interaction("follow", "applied");
        info!(follower = %follower_id, followee = %followee_id, "Follow created");
        Ok(())
    }

    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<()> {
        if follower_id == followee_id {
            return Err(AppError::SelfFollow);
        }
        self.require_account(followee_id).await?;

        let removed = self
            .relationships
            .remove_follow(follower_id, followee_id)
            .await?;
        if !removed {
            metrics::record_interaction("unfollow", "duplicate");
            return Err(AppError::NotFollowing);
        }

        metrics::record_interaction("unfollow", "applied");
        info!(follower = %follower_id, followee = %followee_id, "Follow removed");
        Ok(())
    }

    pub async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        self.relationships
            .is_following(follower_id, followee_id)
            .await
    }

    /// Every known account the user does not follow, oldest account first.
    /// Plain set difference; no ranking.
    pub async fn suggestions(&self, user_id: Uuid) -> AppResult<Vec<AccountSummary>> {
        let following: HashSet<Uuid> = self
            .relationships
            .following(user_id)
            .await?
            .into_iter()
            .collect();
        let candidates: Vec<Uuid> = self
            .accounts
            .all_account_ids()
            .await?
            .into_iter()
            .filter(|id| *id != user_id && !following.contains(id))
            .collect();
        self.summaries(&candidates).await
    }

    pub async fn followers(&self, user_id: Uuid) -> AppResult<Vec<AccountSummary>> {
        self.require_account(user_id).await?;
        let ids = self.relationships.followers(user_id).await?;
        self.summaries(&ids).await
    }

    pub async fn following(&self, user_id: Uuid) -> AppResult<Vec<AccountSummary>> {
        self.require_account(user_id).await?;
        let ids = self.relationships.following(user_id).await?;
        self.summaries(&ids).await
    }

    pub async fn counts(&self, user_id: Uuid) -> AppResult<FollowCounts> {
        self.relationships.follow_counts(user_id).await
    }

    /// Summaries in the order of `ids`, skipping unknown accounts
    async fn summaries(&self, ids: &[Uuid]) -> AppResult<Vec<AccountSummary>> {
        let accounts = self.accounts.get_accounts(ids).await?;
        Ok(ids
            .iter()
            .filter_map(|id| accounts.get(id).map(AccountSummary::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewAccount;
    use crate::error::ErrorKind;
    use chrono::Duration;

    async fn seed(stores: &Stores, name: &str, offset_secs: i64) -> Uuid {
        let account = Account::new(
            NewAccount {
                username: name.into(),
                email: format!("{name}@example.com"),
                full_name: name.into(),
                is_private: false,
            },
            Utc::now() + Duration::seconds(offset_secs),
        );
        stores.accounts.insert_account(&account).await.unwrap();
        account.id
    }

    #[tokio::test]
    async fn follow_then_unfollow() {
        let stores = Stores::in_memory();
        let service = RelationshipService::new(&stores);
        let a = seed(&stores, "alice", 0).await;
        let b = seed(&stores, "bob", 1).await;

        service.follow(a, b).await.unwrap();
        assert!(service.is_following(a, b).await.unwrap());
        assert!(!service.is_following(b, a).await.unwrap());
        assert_eq!(service.followers(b).await.unwrap()[0].id, a);
        assert_eq!(service.counts(a).await.unwrap().following, 1);

        service.unfollow(a, b).await.unwrap();
        assert!(!service.is_following(a, b).await.unwrap());
        assert!(service.followers(b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_follow_and_missing_unfollow_conflict() {
        let stores = Stores::in_memory();
        let service = RelationshipService::new(&stores);
        let a = seed(&stores, "alice", 0).await;
        let b = seed(&stores, "bob", 1).await;

        service.follow(a, b).await.unwrap();
        let err = service.follow(a, b).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyFollowing));
        assert_eq!(service.counts(b).await.unwrap().followers, 1);

        service.unfollow(a, b).await.unwrap();
        let err = service.unfollow(a, b).await.unwrap_err();
        assert!(matches!(err, AppError::NotFollowing));
    }

    #[tokio::test]
    async fn self_and_unknown_targets_are_rejected() {
        let stores = Stores::in_memory();
        let service = RelationshipService::new(&stores);
        let a = seed(&stores, "alice", 0).await;

        assert!(matches!(service.follow(a, a).await, Err(AppError::SelfFollow)));
        assert!(matches!(service.unfollow(a, a).await, Err(AppError::SelfFollow)));
        let err = service.follow(a, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn suggestions_are_the_set_difference() {
        let stores = Stores::in_memory();
        let service = RelationshipService::new(&stores);
        let a = seed(&stores, "alice", 0).await;
        let b = seed(&stores, "bob", 1).await;
        let c = seed(&stores, "carol", 2).await;
        let d = seed(&stores, "dave", 3).await;

        service.follow(a, c).await.unwrap();
        let ids: Vec<Uuid> = service
            .suggestions(a)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![b, d]);
    }
}
