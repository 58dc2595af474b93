use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Account, Comment, ContentItem, ContentKind, Conversation, EngagementTarget, FollowCounts,
    Message, ProfileUpdate,
};
use crate::error::AppResult;

/// Account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. Duplicate username/email is a validation error.
    async fn insert_account(&self, account: &Account) -> AppResult<()>;

    async fn get_account(&self, id: Uuid) -> AppResult<Option<Account>>;

    /// Case-insensitive username lookup
    async fn get_by_username(&self, username: &str) -> AppResult<Option<Account>>;

    /// Batch lookup; missing ids are skipped
    async fn get_accounts(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, Account>>;

    /// Every account id, oldest account first
    async fn all_account_ids(&self) -> AppResult<Vec<Uuid>>;

    /// Case-insensitive substring match on username or full name
    async fn search_accounts(&self, query: &str, limit: usize) -> AppResult<Vec<Account>>;

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Account>>;

    /// Returns false if the account does not exist
    async fn set_privacy(&self, id: Uuid, is_private: bool, now: DateTime<Utc>) -> AppResult<bool>;

    async fn touch_last_active(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()>;
}

/// Follow graph. One edge set; followers and following are both derived from it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Create an edge; returns false if it already existed
    async fn insert_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Remove an edge; returns false if it did not exist
    async fn remove_follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool>;

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool>;

    /// Accounts `user_id` follows, most recent edge first
    async fn following(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Accounts following `user_id`, most recent edge first
    async fn followers(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    async fn follow_counts(&self, user_id: Uuid) -> AppResult<FollowCounts>;
}

/// Owner restriction for a content query
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OwnerFilter {
    #[default]
    Any,
    In(HashSet<Uuid>),
    NotIn(HashSet<Uuid>),
}

impl OwnerFilter {
    pub fn matches(&self, owner_id: Uuid) -> bool {
        match self {
            OwnerFilter::Any => true,
            OwnerFilter::In(owners) => owners.contains(&owner_id),
            OwnerFilter::NotIn(owners) => !owners.contains(&owner_id),
        }
    }
}

/// Content listing query; results are ordered by `created_at` descending
#[derive(Debug, Clone, PartialEq)]
pub struct ContentQuery {
    pub kinds: Vec<ContentKind>,
    pub owners: OwnerFilter,
    pub include_archived: bool,
    /// When set, stories expired at this instant are excluded
    pub active_at: Option<DateTime<Utc>>,
    /// Only content whose owner account is public
    pub public_owners_only: bool,
    /// Applied after every other filter
    pub limit: Option<usize>,
}

impl ContentQuery {
    pub fn of(kind: ContentKind) -> Self {
        Self {
            kinds: vec![kind],
            owners: OwnerFilter::Any,
            include_archived: false,
            active_at: None,
            public_owners_only: false,
            limit: None,
        }
    }

    pub fn owned_by(mut self, owners: impl IntoIterator<Item = Uuid>) -> Self {
        self.owners = OwnerFilter::In(owners.into_iter().collect());
        self
    }

    pub fn not_owned_by(mut self, owners: impl IntoIterator<Item = Uuid>) -> Self {
        self.owners = OwnerFilter::NotIn(owners.into_iter().collect());
        self
    }

    pub fn active_at(mut self, now: DateTime<Utc>) -> Self {
        self.active_at = Some(now);
        self
    }

    pub fn public_owners_only(mut self) -> Self {
        self.public_owners_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an item passes every filter except `public_owners_only` and `limit`
    pub fn matches(&self, item: &ContentItem) -> bool {
        self.kinds.contains(&item.kind())
            && self.owners.matches(item.owner_id)
            && (self.include_archived || !item.is_archived)
            && self.active_at.map_or(true, |now| item.is_active_at(now))
    }
}

/// Posts, reels and stories
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert_content(&self, item: &ContentItem) -> AppResult<()>;

    async fn get_content(&self, id: Uuid) -> AppResult<Option<ContentItem>>;

    /// Persist caption, archive flag and editable body fields
    async fn update_content(&self, item: &ContentItem) -> AppResult<()>;

    /// Delete an item together with its comments, likes and saved references
    async fn delete_content(&self, id: Uuid) -> AppResult<bool>;

    async fn find(&self, query: &ContentQuery) -> AppResult<Vec<ContentItem>>;

    /// Number of items matching the query, ignoring its limit
    async fn count_content(&self, query: &ContentQuery) -> AppResult<i64>;

    /// Delete stories with `expires_at <= now`; returns how many were removed
    async fn purge_expired_stories(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// Returns the new view count, or None if no such reel exists
    async fn increment_reel_views(&self, reel_id: Uuid) -> AppResult<Option<i64>>;

    /// Append-if-absent; returns true if a new view was recorded
    async fn record_story_view(
        &self,
        story_id: Uuid,
        viewer_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;
}

/// Likes on any engageable target and per-account saved content
#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Returns the new like count, or None if the like was already present
    async fn add_like(
        &self,
        target: EngagementTarget,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<i64>>;

    /// Returns the new like count, or None if there was no like to remove
    async fn remove_like(&self, target: EngagementTarget, user_id: Uuid)
        -> AppResult<Option<i64>>;

    async fn like_count(&self, target: EngagementTarget) -> AppResult<i64>;

    /// Subset of `targets` liked by `user_id`
    async fn liked_by(
        &self,
        user_id: Uuid,
        targets: &[EngagementTarget],
    ) -> AppResult<HashSet<EngagementTarget>>;

    async fn add_saved(&self, user_id: Uuid, content_id: Uuid, at: DateTime<Utc>)
        -> AppResult<bool>;

    async fn remove_saved(&self, user_id: Uuid, content_id: Uuid) -> AppResult<bool>;

    /// Saved content ids, most recently saved first
    async fn saved_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;
}

/// Two-level comment trees
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn insert_comment(&self, comment: &Comment) -> AppResult<()>;

    async fn get_comment(&self, id: Uuid) -> AppResult<Option<Comment>>;

    async fn update_comment_text(
        &self,
        id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Comment>>;

    /// Deleting a top-level comment also deletes its replies
    async fn delete_comment(&self, id: Uuid) -> AppResult<bool>;

    /// Oldest first
    async fn top_level_comments(&self, content_id: Uuid) -> AppResult<Vec<Comment>>;

    /// Oldest first
    async fn replies(&self, parent_id: Uuid) -> AppResult<Vec<Comment>>;

    /// All comments on the item, replies included
    async fn comment_count(&self, content_id: Uuid) -> AppResult<i64>;
}

/// Conversations and messages
#[async_trait]
pub trait MessagingStore: Send + Sync {
    async fn find_direct_conversation(&self, a: Uuid, b: Uuid)
        -> AppResult<Option<Conversation>>;

    /// Insert a conversation. For a direct pair that already has one, the
    /// existing conversation is returned instead.
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<Conversation>;

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    /// Active conversations containing `user_id`, most recently updated first
    async fn conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    /// Insert and make it the conversation's last message
    async fn insert_message(&self, message: &Message) -> AppResult<()>;

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Non-deleted messages, oldest first
    async fn list_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    /// Append-if-absent; returns true if a new receipt was recorded
    async fn mark_read(&self, message_id: Uuid, reader_id: Uuid, at: DateTime<Utc>)
        -> AppResult<bool>;

    async fn soft_delete_message(
        &self,
        id: Uuid,
        replacement_text: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Message>>;
}
