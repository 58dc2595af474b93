use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AccountStore, CommentStore, ContentQuery, ContentStore, EngagementStore, MessagingStore,
    RelationshipStore,
};
use crate::domain::{
    Account, Comment, ContentBody, ContentItem, ContentKind, Conversation, EngagementTarget,
    FollowCounts, Message, ProfileUpdate, ReadReceipt, StoryView, TargetKind,
};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    /// (follower, followee) -> edge creation time
    follows: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    content: HashMap<Uuid, ContentItem>,
    likes: HashMap<EngagementTarget, HashMap<Uuid, DateTime<Utc>>>,
    /// account -> (content id, saved at)
    saved: HashMap<Uuid, Vec<(Uuid, DateTime<Utc>)>>,
    comments: HashMap<Uuid, Comment>,
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Message>,
}

impl State {
    fn like_count(&self, target: &EngagementTarget) -> i64 {
        self.likes.get(target).map_or(0, |l| l.len() as i64)
    }

    fn drop_comment(&mut self, id: Uuid) {
        if self.comments.remove(&id).is_some() {
            self.likes
                .remove(&EngagementTarget::new(TargetKind::Comment, id));
        }
    }

    fn drop_content(&mut self, id: Uuid) -> bool {
        let Some(item) = self.content.remove(&id) else {
            return false;
        };
        let comment_ids: Vec<Uuid> = self
            .comments
            .values()
            .filter(|c| c.content_id == id)
            .map(|c| c.id)
            .collect();
        for comment_id in comment_ids {
            self.drop_comment(comment_id);
        }
        self.likes
            .remove(&EngagementTarget::new(item.kind().into(), id));
        for saved in self.saved.values_mut() {
            saved.retain(|(content_id, _)| *content_id != id);
        }
        true
    }

    fn matching_content<'a>(
        &'a self,
        query: &'a ContentQuery,
    ) -> impl Iterator<Item = &'a ContentItem> + 'a {
        self.content
            .values()
            .filter(move |item| query.matches(item))
            .filter(move |item| {
                !query.public_owners_only
                    || self
                        .accounts
                        .get(&item.owner_id)
                        .map_or(false, |owner| !owner.is_private)
            })
    }

    fn edges_sorted<F>(&self, select: F) -> Vec<Uuid>
    where
        F: Fn(&(Uuid, Uuid)) -> Option<Uuid>,
    {
        let mut edges: Vec<(Uuid, DateTime<Utc>)> = self
            .follows
            .iter()
            .filter_map(|(edge, at)| select(edge).map(|id| (id, *at)))
            .collect();
        edges.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        edges.into_iter().map(|(id, _)| id).collect()
    }
}

/// In-process store backing every store trait behind a single lock.
///
/// Used by tests and by the `memory` store backend.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> AppResult<()> {
        let mut state = self.state.write().await;
        let username = account.username.to_lowercase();
        for existing in state.accounts.values() {
            if existing.username.to_lowercase() == username {
                return Err(AppError::validation("username already taken"));
            }
            if existing.email == account.email {
                return Err(AppError::validation("email already registered"));
            }
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> AppResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<Account>> {
        let username = username.to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.username.to_lowercase() == username)
            .cloned())
    }

    async fn get_accounts(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, Account>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.accounts.get(id).map(|a| (*id, a.clone())))
            .collect())
    }

    async fn all_account_ids(&self) -> AppResult<Vec<Uuid>> {
        let state = self.state.read().await;
        let mut accounts: Vec<&Account> = state.accounts.values().collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(accounts.into_iter().map(|a| a.id).collect())
    }

    async fn search_accounts(&self, query: &str, limit: usize) -> AppResult<Vec<Account>> {
        let needle = query.to_lowercase();
        let state = self.state.read().await;
        let mut matches: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| {
                a.username.to_lowercase().contains(&needle)
                    || a.full_name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.username.cmp(&b.username));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Account>> {
        let mut state = self.state.write().await;
        let Some(account) = state.accounts.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(full_name) = &update.full_name {
            account.full_name = full_name.clone();
        }
        if let Some(bio) = &update.bio {
            account.bio = bio.clone();
        }
        if let Some(website) = &update.website {
            account.website = website.clone();
        }
        if let Some(profile_image) = &update.profile_image {
            account.profile_image = profile_image.clone();
        }
        account.updated_at = now;
        Ok(Some(account.clone()))
    }

    async fn set_privacy(&self, id: Uuid, is_private: bool, now: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.accounts.get_mut(&id) {
            Some(account) => {
                account.is_private = is_private;
                account.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_last_active(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(account) = self.state.write().await.accounts.get_mut(&id) {
            account.last_active = now;
        }
        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for MemoryStore {
    async fn insert_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let key = (follower_id, followee_id);
        if state.follows.contains_key(&key) {
            return Ok(false);
        }
        state.follows.insert(key, at);
        Ok(true)
    }

    async fn remove_follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.follows.remove(&(follower_id, followee_id)).is_some())
    }

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state.follows.contains_key(&(follower_id, followee_id)))
    }

    async fn following(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state.edges_sorted(|(follower, followee)| (*follower == user_id).then_some(*followee)))
    }

    async fn followers(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state.edges_sorted(|(follower, followee)| (*followee == user_id).then_some(*follower)))
    }

    async fn follow_counts(&self, user_id: Uuid) -> AppResult<FollowCounts> {
        let state = self.state.read().await;
        let mut counts = FollowCounts::default();
        for (follower, followee) in state.follows.keys() {
            if *follower == user_id {
                counts.following += 1;
            }
            if *followee == user_id {
                counts.followers += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_content(&self, item: &ContentItem) -> AppResult<()> {
        self.state.write().await.content.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_content(&self, id: Uuid) -> AppResult<Option<ContentItem>> {
        Ok(self.state.read().await.content.get(&id).cloned())
    }

    async fn update_content(&self, item: &ContentItem) -> AppResult<()> {
        let mut state = self.state.write().await;
        match state.content.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(AppError::not_found(item.kind().resource_name())),
        }
    }

    async fn delete_content(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.state.write().await.drop_content(id))
    }

    async fn find(&self, query: &ContentQuery) -> AppResult<Vec<ContentItem>> {
        let state = self.state.read().await;
        let mut items: Vec<&ContentItem> = state.matching_content(query).collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items.into_iter().cloned().collect())
    }

    async fn count_content(&self, query: &ContentQuery) -> AppResult<i64> {
        let state = self.state.read().await;
        Ok(state.matching_content(query).count() as i64)
    }

    async fn purge_expired_stories(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let expired: Vec<Uuid> = state
            .content
            .values()
            .filter(|item| item.kind() == ContentKind::Story && !item.is_active_at(now))
            .map(|item| item.id)
            .collect();
        for id in &expired {
            state.drop_content(*id);
        }
        Ok(expired.len() as u64)
    }

    async fn increment_reel_views(&self, reel_id: Uuid) -> AppResult<Option<i64>> {
        let mut state = self.state.write().await;
        match state.content.get_mut(&reel_id).map(|item| &mut item.body) {
            Some(ContentBody::Reel { views, .. }) => {
                *views += 1;
                Ok(Some(*views))
            }
            _ => Ok(None),
        }
    }

    async fn record_story_view(
        &self,
        story_id: Uuid,
        viewer_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.content.get_mut(&story_id).map(|item| &mut item.body) {
            Some(ContentBody::Story { viewers, .. }) => {
                if viewers.iter().any(|v| v.viewer_id == viewer_id) {
                    return Ok(false);
                }
                viewers.push(StoryView {
                    viewer_id,
                    viewed_at: at,
                });
                Ok(true)
            }
            _ => Err(AppError::not_found("Story")),
        }
    }
}

#[async_trait]
impl EngagementStore for MemoryStore {
    async fn add_like(
        &self,
        target: EngagementTarget,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<i64>> {
        let mut state = self.state.write().await;
        let likes = state.likes.entry(target).or_default();
        if likes.contains_key(&user_id) {
            return Ok(None);
        }
        likes.insert(user_id, at);
        Ok(Some(likes.len() as i64))
    }

    async fn remove_like(
        &self,
        target: EngagementTarget,
        user_id: Uuid,
    ) -> AppResult<Option<i64>> {
        let mut state = self.state.write().await;
        let Some(likes) = state.likes.get_mut(&target) else {
            return Ok(None);
        };
        if likes.remove(&user_id).is_none() {
            return Ok(None);
        }
        Ok(Some(likes.len() as i64))
    }

    async fn like_count(&self, target: EngagementTarget) -> AppResult<i64> {
        Ok(self.state.read().await.like_count(&target))
    }

    async fn liked_by(
        &self,
        user_id: Uuid,
        targets: &[EngagementTarget],
    ) -> AppResult<HashSet<EngagementTarget>> {
        let state = self.state.read().await;
        Ok(targets
            .iter()
            .filter(|t| state.likes.get(t).map_or(false, |l| l.contains_key(&user_id)))
            .copied()
            .collect())
    }

    async fn add_saved(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let saved = state.saved.entry(user_id).or_default();
        if saved.iter().any(|(id, _)| *id == content_id) {
            return Ok(false);
        }
        saved.push((content_id, at));
        Ok(true)
    }

    async fn remove_saved(&self, user_id: Uuid, content_id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(saved) = state.saved.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = saved.len();
        saved.retain(|(id, _)| *id != content_id);
        Ok(saved.len() != before)
    }

    async fn saved_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let state = self.state.read().await;
        let mut saved = state.saved.get(&user_id).cloned().unwrap_or_default();
        // Insertion order breaks ties between equal timestamps
        saved.reverse();
        saved.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(saved.into_iter().map(|(id, _)| id).collect())
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn insert_comment(&self, comment: &Comment) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.content.contains_key(&comment.content_id) {
            return Err(AppError::not_found("Content"));
        }
        state.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn get_comment(&self, id: Uuid) -> AppResult<Option<Comment>> {
        Ok(self.state.read().await.comments.get(&id).cloned())
    }

    async fn update_comment_text(
        &self,
        id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Comment>> {
        let mut state = self.state.write().await;
        Ok(state.comments.get_mut(&id).map(|comment| {
            comment.text = text.to_string();
            comment.updated_at = now;
            comment.clone()
        }))
    }

    async fn delete_comment(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if !state.comments.contains_key(&id) {
            return Ok(false);
        }
        let replies: Vec<Uuid> = state
            .comments
            .values()
            .filter(|c| c.parent_id == Some(id))
            .map(|c| c.id)
            .collect();
        for reply in replies {
            state.drop_comment(reply);
        }
        state.drop_comment(id);
        Ok(true)
    }

    async fn top_level_comments(&self, content_id: Uuid) -> AppResult<Vec<Comment>> {
        let state = self.state.read().await;
        let mut comments: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| c.content_id == content_id && c.is_top_level())
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn replies(&self, parent_id: Uuid) -> AppResult<Vec<Comment>> {
        let state = self.state.read().await;
        let mut replies: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| c.parent_id == Some(parent_id))
            .cloned()
            .collect();
        replies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(replies)
    }

    async fn comment_count(&self, content_id: Uuid) -> AppResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .values()
            .filter(|c| c.content_id == content_id)
            .count() as i64)
    }
}

#[async_trait]
impl MessagingStore for MemoryStore {
    async fn find_direct_conversation(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .values()
            .find(|c| !c.is_group && c.has_participant(a) && c.has_participant(b))
            .cloned())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<Conversation> {
        let mut state = self.state.write().await;
        if !conversation.is_group {
            if let Some(existing) = state
                .conversations
                .values()
                .find(|c| !c.is_group && c.participants == conversation.participants)
            {
                return Ok(existing.clone());
            }
        }
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation.clone())
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.is_active && c.has_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(conversations)
    }

    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        let mut state = self.state.write().await;
        let Some(conversation) = state.conversations.get_mut(&message.conversation_id) else {
            return Err(AppError::not_found("Conversation"));
        };
        conversation.last_message_id = Some(message.id);
        conversation.updated_at = message.created_at;
        state.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.state.read().await.messages.get(&id).cloned())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let state = self.state.read().await;
        let mut messages: Vec<Message> = state
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id && !m.is_deleted)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn mark_read(
        &self,
        message_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(message) = state.messages.get_mut(&message_id) else {
            return Err(AppError::not_found("Message"));
        };
        if message.is_read_by(reader_id) {
            return Ok(false);
        }
        message.read_by.push(ReadReceipt {
            user_id: reader_id,
            read_at: at,
        });
        Ok(true)
    }

    async fn soft_delete_message(
        &self,
        id: Uuid,
        replacement_text: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let mut state = self.state.write().await;
        Ok(state.messages.get_mut(&id).map(|message| {
            message.is_deleted = true;
            message.text = Some(replacement_text.to_string());
            message.media_url = None;
            message.media_type = None;
            message.updated_at = now;
            message.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageInput, NewAccount, NewPost};
    use chrono::Duration;

    fn account(name: &str) -> Account {
        Account::new(
            NewAccount {
                username: name.into(),
                email: format!("{name}@example.com"),
                full_name: name.into(),
                is_private: false,
            },
            Utc::now(),
        )
    }

    fn post(owner: Uuid, at: DateTime<Utc>) -> ContentItem {
        ContentItem::new_post(
            owner,
            NewPost {
                caption: String::new(),
                images: vec!["/img.jpg".into()],
                location: None,
            },
            at,
        )
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected_case_insensitively() {
        let store = MemoryStore::new();
        store.insert_account(&account("alice")).await.unwrap();
        let mut dup = account("ALICE");
        dup.email = "other@example.com".into();
        let err = store.insert_account(&dup).await.unwrap_err();
        assert!(err.to_string().contains("username already taken"));
    }

    #[tokio::test]
    async fn follow_edge_feeds_both_views() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(store.insert_follow(a, b, Utc::now()).await.unwrap());
        assert!(!store.insert_follow(a, b, Utc::now()).await.unwrap());
        assert_eq!(store.following(a).await.unwrap(), vec![b]);
        assert_eq!(store.followers(b).await.unwrap(), vec![a]);
        let counts = store.follow_counts(a).await.unwrap();
        assert_eq!(counts, FollowCounts { followers: 0, following: 1 });
    }

    #[tokio::test]
    async fn find_orders_newest_first_and_limits() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let old = post(owner, now - Duration::hours(2));
        let new = post(owner, now);
        store.insert_content(&old).await.unwrap();
        store.insert_content(&new).await.unwrap();

        let found = store.find(&ContentQuery::of(ContentKind::Post)).await.unwrap();
        assert_eq!(found.iter().map(|i| i.id).collect::<Vec<_>>(), vec![new.id, old.id]);

        let limited = store
            .find(&ContentQuery::of(ContentKind::Post).limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn delete_content_cascades() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let fan = Uuid::new_v4();
        let item = post(owner, Utc::now());
        store.insert_content(&item).await.unwrap();
        let comment = Comment::new(fan, item.id, "nice", None, Utc::now());
        store.insert_comment(&comment).await.unwrap();
        let target = EngagementTarget::new(TargetKind::Post, item.id);
        store.add_like(target, fan, Utc::now()).await.unwrap();
        store.add_saved(fan, item.id, Utc::now()).await.unwrap();

        assert!(store.delete_content(item.id).await.unwrap());
        assert!(store.get_comment(comment.id).await.unwrap().is_none());
        assert_eq!(store.like_count(target).await.unwrap(), 0);
        assert!(store.saved_ids(fan).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn direct_conversation_is_unique_per_pair() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = store
            .insert_conversation(&Conversation::direct(a, b, Utc::now()))
            .await
            .unwrap();
        let second = store
            .insert_conversation(&Conversation::direct(b, a, Utc::now()))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn insert_message_updates_conversation() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation = store
            .insert_conversation(&Conversation::direct(a, b, Utc::now()))
            .await
            .unwrap();
        let message = Message::new(
            conversation.id,
            a,
            MessageInput {
                text: Some("hey".into()),
                ..Default::default()
            },
            Utc::now() + Duration::seconds(1),
        );
        store.insert_message(&message).await.unwrap();
        let stored = store.get_conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message_id, Some(message.id));
        assert_eq!(stored.updated_at, message.created_at);
    }
}
