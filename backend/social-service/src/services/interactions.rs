use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::visibility::VisibilityEngine;
use crate::domain::{
    Account, ContentItem, ContentKind, EngagementTarget, Engageable, Message, TargetKind,
};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::repository::Stores;

/// Result of a story view request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewOutcome {
    /// A new view entry was appended
    Recorded,
    /// The viewer was already in the story's viewers
    AlreadyViewed,
    /// Owners count as having viewed their own stories; nothing is stored
    Owner,
}

/// Idempotent toggles: likes, saves, story views and read receipts.
///
/// Each toggle is at-most-once: a repeated request fails with the matching
/// conflict error (or is a no-op for views and receipts) and never changes
/// a count twice.
#[derive(Clone)]
pub struct InteractionLedger {
    stores: Stores,
    visibility: VisibilityEngine,
}

impl InteractionLedger {
    pub fn new(stores: Stores, visibility: VisibilityEngine) -> Self {
        Self { stores, visibility }
    }

    async fn owner_account(&self, owner_id: Uuid) -> AppResult<Account> {
        self.stores
            .accounts
            .get_account(owner_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    /// Load a live content item of the expected kind
    pub(crate) async fn live_content(&self, kind: ContentKind, id: Uuid) -> AppResult<ContentItem> {
        match self.stores.content.get_content(id).await? {
            Some(item) if item.kind() == kind && item.is_active_at(Utc::now()) => Ok(item),
            _ => Err(AppError::not_found(kind.resource_name())),
        }
    }

    /// Archived items exist only for their owner
    pub(crate) fn ensure_not_archived(viewer: Option<Uuid>, item: &ContentItem) -> AppResult<()> {
        if item.is_archived && viewer != Some(item.owner_id) {
            return Err(AppError::not_found(item.kind().resource_name()));
        }
        Ok(())
    }

    /// Resolve the content item whose owner governs access to `target`.
    /// For comments that is the commented item.
    async fn governing_content(&self, target: EngagementTarget) -> AppResult<ContentItem> {
        match target.kind {
            TargetKind::Comment => {
                let comment = self
                    .stores
                    .comments
                    .get_comment(target.id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Comment"))?;
                self.stores
                    .content
                    .get_content(comment.content_id)
                    .await?
                    .filter(|item| item.is_active_at(Utc::now()))
                    .ok_or_else(|| AppError::not_found("Comment"))
            }
            TargetKind::Post => self.live_content(ContentKind::Post, target.id).await,
            TargetKind::Reel => self.live_content(ContentKind::Reel, target.id).await,
            TargetKind::Story => self.live_content(ContentKind::Story, target.id).await,
        }
    }

    async fn ensure_target_visible(&self, viewer: Uuid, target: EngagementTarget) -> AppResult<()> {
        let item = self.governing_content(target).await?;
        Self::ensure_not_archived(Some(viewer), &item)?;
        let owner = self.owner_account(item.owner_id()).await?;
        self.visibility.ensure_can_view(Some(viewer), &owner).await
    }

    /// Like `target`; returns the new like count
    pub async fn like(&self, viewer: Uuid, target: EngagementTarget) -> AppResult<i64> {
        let action = format!("like_{}", target.kind.as_str());
        if let Err(err) = self.ensure_target_visible(viewer, target).await {
            metrics::record_interaction(&action, "rejected");
            return Err(err);
        }

        match self
            .stores
            .engagement
            .add_like(target, viewer, Utc::now())
            .await?
        {
            Some(count) => {
                metrics::record_interaction(&action, "applied");
                debug!(viewer = %viewer, target = %target.id, count, "Like recorded");
                Ok(count)
            }
            None => {
                metrics::record_interaction(&action, "duplicate");
                Err(AppError::AlreadyLiked)
            }
        }
    }

    /// Remove a like; returns the new like count.
    /// Only existence is checked, so a like can be withdrawn after losing access.
    pub async fn unlike(&self, viewer: Uuid, target: EngagementTarget) -> AppResult<i64> {
        let action = format!("unlike_{}", target.kind.as_str());
        self.governing_content(target).await?;

        match self.stores.engagement.remove_like(target, viewer).await? {
            Some(count) => {
                metrics::record_interaction(&action, "applied");
                Ok(count)
            }
            None => {
                metrics::record_interaction(&action, "duplicate");
                Err(AppError::NotLiked)
            }
        }
    }

    /// Like anything engageable
    pub async fn like_item<E: Engageable + Sync>(&self, viewer: Uuid, item: &E) -> AppResult<i64> {
        self.like(viewer, item.engagement_target()).await
    }

    pub async fn save(&self, viewer: Uuid, content_id: Uuid) -> AppResult<()> {
        let item = self
            .stores
            .content
            .get_content(content_id)
            .await?
            .filter(|item| item.is_active_at(Utc::now()))
            .ok_or_else(|| AppError::not_found("Content"))?;
        Self::ensure_not_archived(Some(viewer), &item)?;
        let owner = self.owner_account(item.owner_id).await?;
        self.visibility.ensure_can_view(Some(viewer), &owner).await?;

        if !self
            .stores
            .engagement
            .add_saved(viewer, content_id, Utc::now())
            .await?
        {
            metrics::record_interaction("save", "duplicate");
            return Err(AppError::AlreadySaved);
        }
        metrics::record_interaction("save", "applied");
        Ok(())
    }

    pub async fn unsave(&self, viewer: Uuid, content_id: Uuid) -> AppResult<()> {
        if !self.stores.engagement.remove_saved(viewer, content_id).await? {
            metrics::record_interaction("unsave", "duplicate");
            return Err(AppError::NotSaved);
        }
        metrics::record_interaction("unsave", "applied");
        Ok(())
    }

    /// Record that `viewer` saw `story`. Visibility must already be checked.
    pub async fn record_view(&self, viewer: Uuid, story: &ContentItem) -> AppResult<ViewOutcome> {
        if story.kind() != ContentKind::Story {
            return Err(AppError::validation("only stories record views"));
        }
        if story.owner_id == viewer {
            return Ok(ViewOutcome::Owner);
        }
        let recorded = self
            .stores
            .content
            .record_story_view(story.id, viewer, Utc::now())
            .await?;
        Ok(if recorded {
            metrics::record_interaction("story_view", "applied");
            ViewOutcome::Recorded
        } else {
            ViewOutcome::AlreadyViewed
        })
    }

    /// Increment a reel's view counter. Not deduplicated per viewer.
    pub async fn record_reel_view(&self, viewer: Option<Uuid>, reel_id: Uuid) -> AppResult<i64> {
        let reel = self.live_content(ContentKind::Reel, reel_id).await?;
        Self::ensure_not_archived(viewer, &reel)?;
        let owner = self.owner_account(reel.owner_id).await?;
        self.visibility.ensure_can_view(viewer, &owner).await?;

        self.stores
            .content
            .increment_reel_views(reel_id)
            .await?
            .ok_or_else(|| AppError::not_found("Reel"))
    }

    /// Mark a message read by a conversation participant.
    /// Returns false if the receipt already existed.
    pub async fn mark_read(&self, viewer: Uuid, message_id: Uuid) -> AppResult<bool> {
        let message = self
            .stores
            .messaging
            .get_message(message_id)
            .await?
            .ok_or_else(|| AppError::not_found("Message"))?;
        let conversation = self
            .stores
            .messaging
            .get_conversation(message.conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;
        if !conversation.has_participant(viewer) {
            return Err(AppError::forbidden("Not a participant of this conversation"));
        }
        self.mark_read_unchecked(viewer, &message).await
    }

    /// Participant check is the caller's responsibility
    pub(crate) async fn mark_read_unchecked(&self, viewer: Uuid, message: &Message) -> AppResult<bool> {
        if message.is_read_by(viewer) {
            return Ok(false);
        }
        let recorded = self
            .stores
            .messaging
            .mark_read(message.id, viewer, Utc::now())
            .await?;
        if recorded {
            info!(viewer = %viewer, message = %message.id, "Message marked read");
        }
        Ok(recorded)
    }

    /// A message is unread for a viewer who did not send it and has no receipt
    pub fn is_unread(viewer: Uuid, message: &Message) -> bool {
        message.sender_id != viewer && !message.is_read_by(viewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Conversation, MediaType, MessageInput, NewAccount, NewPost, NewStory,
    };
    use crate::error::ErrorKind;
    use chrono::Duration;

    struct Fixture {
        stores: Stores,
        ledger: InteractionLedger,
    }

    impl Fixture {
        fn new() -> Self {
            let stores = Stores::in_memory();
            let visibility = VisibilityEngine::new(stores.relationships.clone());
            let ledger = InteractionLedger::new(stores.clone(), visibility);
            Self { stores, ledger }
        }

        async fn account(&self, name: &str, is_private: bool) -> Uuid {
            let account = Account::new(
                NewAccount {
                    username: name.into(),
                    email: format!("{name}@example.com"),
                    full_name: name.into(),
                    is_private,
                },
                Utc::now(),
            );
            self.stores.accounts.insert_account(&account).await.unwrap();
            account.id
        }

        async fn post(&self, owner: Uuid) -> ContentItem {
            let item = ContentItem::new_post(
                owner,
                NewPost {
                    caption: "hello".into(),
                    images: vec!["/a.jpg".into()],
                    location: None,
                },
                Utc::now(),
            );
            self.stores.content.insert_content(&item).await.unwrap();
            item
        }

        async fn story(&self, owner: Uuid) -> ContentItem {
            let item = ContentItem::new_story(
                owner,
                NewStory {
                    media_url: "/s.jpg".into(),
                    media_type: MediaType::Image,
                    caption: String::new(),
                },
                Utc::now(),
                Duration::hours(24),
            );
            self.stores.content.insert_content(&item).await.unwrap();
            item
        }
    }

    #[tokio::test]
    async fn like_twice_counts_once() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let fan = fx.account("fan", false).await;
        let post = fx.post(owner).await;

        assert_eq!(fx.ledger.like_item(fan, &post).await.unwrap(), 1);
        let err = fx.ledger.like_item(fan, &post).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyLiked));
        let count = fx
            .stores
            .engagement
            .like_count(post.engagement_target())
            .await
            .unwrap();
        assert_eq!(count, 1);

        assert_eq!(fx.ledger.unlike(fan, post.engagement_target()).await.unwrap(), 0);
        let err = fx.ledger.unlike(fan, post.engagement_target()).await.unwrap_err();
        assert!(matches!(err, AppError::NotLiked));
    }

    #[tokio::test]
    async fn private_content_cannot_be_liked_or_saved_by_strangers() {
        let fx = Fixture::new();
        let owner = fx.account("owner", true).await;
        let stranger = fx.account("stranger", false).await;
        let post = fx.post(owner).await;

        let err = fx.ledger.like_item(stranger, &post).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = fx.ledger.save(stranger, post.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn archived_content_is_hidden_from_engagement() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let fan = fx.account("fan", false).await;
        let mut post = fx.post(owner).await;
        post.is_archived = true;
        fx.stores.content.update_content(&post).await.unwrap();

        let err = fx.ledger.like_item(fan, &post).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = fx.ledger.save(fan, post.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let count = fx
            .stores
            .engagement
            .like_count(post.engagement_target())
            .await
            .unwrap();
        assert_eq!(count, 0);

        // The owner still sees the archive
        assert_eq!(fx.ledger.like_item(owner, &post).await.unwrap(), 1);
        fx.ledger.save(owner, post.id).await.unwrap();
    }

    #[tokio::test]
    async fn like_on_missing_target_is_not_found() {
        let fx = Fixture::new();
        let fan = fx.account("fan", false).await;
        let target = EngagementTarget::new(TargetKind::Reel, Uuid::new_v4());
        let err = fx.ledger.like(fan, target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn save_toggles_conflict() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let fan = fx.account("fan", false).await;
        let post = fx.post(owner).await;

        fx.ledger.save(fan, post.id).await.unwrap();
        assert!(matches!(fx.ledger.save(fan, post.id).await, Err(AppError::AlreadySaved)));
        fx.ledger.unsave(fan, post.id).await.unwrap();
        assert!(matches!(fx.ledger.unsave(fan, post.id).await, Err(AppError::NotSaved)));
    }

    #[tokio::test]
    async fn story_view_is_recorded_once() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let viewer = fx.account("viewer", false).await;
        let story = fx.story(owner).await;

        assert_eq!(fx.ledger.record_view(viewer, &story).await.unwrap(), ViewOutcome::Recorded);
        assert_eq!(
            fx.ledger.record_view(viewer, &story).await.unwrap(),
            ViewOutcome::AlreadyViewed
        );
        assert_eq!(fx.ledger.record_view(owner, &story).await.unwrap(), ViewOutcome::Owner);

        let stored = fx.stores.content.get_content(story.id).await.unwrap().unwrap();
        assert_eq!(stored.story_viewers().len(), 1);
        assert!(stored.viewed_by(viewer));
    }

    #[tokio::test]
    async fn mark_read_twice_keeps_one_receipt() {
        let fx = Fixture::new();
        let a = fx.account("alice", false).await;
        let b = fx.account("bob", false).await;
        let conversation = fx
            .stores
            .messaging
            .insert_conversation(&Conversation::direct(a, b, Utc::now()))
            .await
            .unwrap();
        let message = Message::new(
            conversation.id,
            a,
            MessageInput {
                text: Some("hi".into()),
                ..Default::default()
            },
            Utc::now(),
        );
        fx.stores.messaging.insert_message(&message).await.unwrap();
        assert!(InteractionLedger::is_unread(b, &message));
        assert!(!InteractionLedger::is_unread(a, &message));

        assert!(fx.ledger.mark_read(b, message.id).await.unwrap());
        assert!(!fx.ledger.mark_read(b, message.id).await.unwrap());

        let stored = fx.stores.messaging.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.read_by.len(), 2);
        assert!(!InteractionLedger::is_unread(b, &stored));

        let outsider = fx.account("eve", false).await;
        let err = fx.ledger.mark_read(outsider, message.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn reel_views_are_not_deduplicated() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let reel = ContentItem::new_reel(
            owner,
            crate::domain::NewReel {
                video_url: "/v.mp4".into(),
                thumbnail_url: "/t.jpg".into(),
                caption: String::new(),
                audio_name: None,
            },
            Utc::now(),
        );
        fx.stores.content.insert_content(&reel).await.unwrap();

        assert_eq!(fx.ledger.record_reel_view(None, reel.id).await.unwrap(), 1);
        assert_eq!(fx.ledger.record_reel_view(None, reel.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_duplicate_toggles_apply_once() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let fan = fx.account("fan", false).await;
        let post = fx.post(owner).await;
        let story = fx.story(owner).await;

        let (first, second) = tokio::join!(
            fx.ledger.like_item(fan, &post),
            fx.ledger.like_item(fan, &post)
        );
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AppError::AlreadyLiked)))
                .count(),
            1
        );
        let count = fx
            .stores
            .engagement
            .like_count(post.engagement_target())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let (first, second) = tokio::join!(
            fx.ledger.record_view(fan, &story),
            fx.ledger.record_view(fan, &story)
        );
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|o| *o == ViewOutcome::AlreadyViewed);
        assert_eq!(outcomes, vec![ViewOutcome::Recorded, ViewOutcome::AlreadyViewed]);
        let stored = fx.stores.content.get_content(story.id).await.unwrap().unwrap();
        assert_eq!(stored.story_viewers().len(), 1);

        let conversation = fx
            .stores
            .messaging
            .insert_conversation(&Conversation::direct(owner, fan, Utc::now()))
            .await
            .unwrap();
        let message = Message::new(
            conversation.id,
            owner,
            MessageInput {
                text: Some("hi".into()),
                ..Default::default()
            },
            Utc::now(),
        );
        fx.stores.messaging.insert_message(&message).await.unwrap();

        let (first, second) = tokio::join!(
            fx.ledger.mark_read(fan, message.id),
            fx.ledger.mark_read(fan, message.id)
        );
        assert!(first.unwrap() ^ second.unwrap());
        let stored = fx.stores.messaging.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.read_by.len(), 2);
    }
}
