use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::feed::FeedAssembler;
use super::interactions::{InteractionLedger, ViewOutcome};
use super::visibility::VisibilityEngine;
use crate::domain::{
    AnnotatedContent, ContentBody, ContentItem, ContentKind, ContentUpdate, MediaType, NewPost,
    NewReel, NewStory, StoryEntry, StoryView,
};
use crate::error::{AppError, AppResult};
use crate::repository::Stores;

/// Create, read, edit, archive and delete posts, reels and stories
#[derive(Clone)]
pub struct ContentService {
    stores: Stores,
    visibility: VisibilityEngine,
    ledger: InteractionLedger,
    feed: FeedAssembler,
    story_ttl: Duration,
}

impl ContentService {
    pub fn new(
        stores: Stores,
        visibility: VisibilityEngine,
        ledger: InteractionLedger,
        feed: FeedAssembler,
        story_ttl: Duration,
    ) -> Self {
        Self {
            stores,
            visibility,
            ledger,
            feed,
            story_ttl,
        }
    }

    async fn store_new(&self, item: ContentItem) -> AppResult<ContentItem> {
        self.stores.content.insert_content(&item).await?;
        info!(owner = %item.owner_id, id = %item.id, kind = item.kind().as_str(), "Content created");
        Ok(item)
    }

    pub async fn create_post(&self, viewer: Uuid, input: NewPost) -> AppResult<ContentItem> {
        input.validate()?;
        if input.images.iter().any(|url| url.trim().is_empty()) {
            return Err(AppError::validation("image urls must not be empty"));
        }
        self.store_new(ContentItem::new_post(viewer, input, Utc::now()))
            .await
    }

    pub async fn create_reel(&self, viewer: Uuid, input: NewReel) -> AppResult<ContentItem> {
        input.validate()?;
        self.store_new(ContentItem::new_reel(viewer, input, Utc::now()))
            .await
    }

    pub async fn create_story(&self, viewer: Uuid, input: NewStory) -> AppResult<ContentItem> {
        input.validate()?;
        if input.media_type == MediaType::Audio {
            return Err(AppError::validation("stories must be an image or a video"));
        }
        self.store_new(ContentItem::new_story(
            viewer,
            input,
            Utc::now(),
            self.story_ttl,
        ))
        .await
    }

    /// Live item of `kind` that the viewer may see. Archived items are only
    /// visible to their owner.
    async fn visible_item(
        &self,
        viewer: Option<Uuid>,
        kind: ContentKind,
        id: Uuid,
    ) -> AppResult<ContentItem> {
        let item = self.ledger.live_content(kind, id).await?;
        InteractionLedger::ensure_not_archived(viewer, &item)?;
        let owner = self
            .stores
            .accounts
            .get_account(item.owner_id)
            .await?
            .ok_or_else(|| AppError::not_found(kind.resource_name()))?;
        self.visibility.ensure_can_view(viewer, &owner).await?;
        Ok(item)
    }

    async fn annotate_one(&self, viewer: Option<Uuid>, item: ContentItem) -> AppResult<AnnotatedContent> {
        let kind = item.kind();
        self.feed
            .annotate(viewer, vec![item])
            .await?
            .pop()
            .ok_or_else(|| AppError::not_found(kind.resource_name()))
    }

    pub async fn get_post(&self, viewer: Option<Uuid>, id: Uuid) -> AppResult<AnnotatedContent> {
        let item = self.visible_item(viewer, ContentKind::Post, id).await?;
        self.annotate_one(viewer, item).await
    }

    /// Fetching a reel counts as a view
    pub async fn get_reel(&self, viewer: Option<Uuid>, id: Uuid) -> AppResult<AnnotatedContent> {
        let mut item = self.visible_item(viewer, ContentKind::Reel, id).await?;
        let new_views = self.ledger.record_reel_view(viewer, id).await?;
        if let ContentBody::Reel { views, .. } = &mut item.body {
            *views = new_views;
        }
        self.annotate_one(viewer, item).await
    }

    /// Fetching a story records the viewer
    pub async fn get_story(&self, viewer: Option<Uuid>, id: Uuid) -> AppResult<StoryEntry> {
        let mut story = self.visible_item(viewer, ContentKind::Story, id).await?;
        let Some(viewer_id) = viewer else {
            return Ok(StoryEntry {
                story,
                viewed: false,
            });
        };

        let outcome = self.ledger.record_view(viewer_id, &story).await?;
        if outcome == ViewOutcome::Recorded {
            if let ContentBody::Story { viewers, .. } = &mut story.body {
                viewers.push(StoryView {
                    viewer_id,
                    viewed_at: Utc::now(),
                });
            }
        }
        Ok(StoryEntry {
            story,
            viewed: true,
        })
    }

    /// Load an item of `kind` owned by `viewer`
    async fn owned_item(&self, viewer: Uuid, kind: ContentKind, id: Uuid) -> AppResult<ContentItem> {
        let item = self
            .stores
            .content
            .get_content(id)
            .await?
            .filter(|item| item.kind() == kind)
            .ok_or_else(|| AppError::not_found(kind.resource_name()))?;
        if item.owner_id != viewer {
            return Err(AppError::forbidden(format!(
                "Only the owner can modify this {}",
                kind.as_str()
            )));
        }
        Ok(item)
    }

    pub async fn update_post(
        &self,
        viewer: Uuid,
        id: Uuid,
        update: ContentUpdate,
    ) -> AppResult<ContentItem> {
        update.validate()?;
        let mut item = self.owned_item(viewer, ContentKind::Post, id).await?;
        if let Some(caption) = update.caption {
            item.caption = caption;
        }
        if let (ContentBody::Post { location, .. }, Some(new_location)) =
            (&mut item.body, update.location)
        {
            *location = new_location;
        }
        item.updated_at = Utc::now();
        self.stores.content.update_content(&item).await?;
        Ok(item)
    }

    pub async fn update_reel(
        &self,
        viewer: Uuid,
        id: Uuid,
        update: ContentUpdate,
    ) -> AppResult<ContentItem> {
        update.validate()?;
        let mut item = self.owned_item(viewer, ContentKind::Reel, id).await?;
        if let Some(caption) = update.caption {
            item.caption = caption;
        }
        if let (ContentBody::Reel { audio_name, .. }, Some(new_audio)) =
            (&mut item.body, update.audio_name)
        {
            if !new_audio.trim().is_empty() {
                *audio_name = new_audio;
            }
        }
        item.updated_at = Utc::now();
        self.stores.content.update_content(&item).await?;
        Ok(item)
    }

    pub async fn archive(
        &self,
        viewer: Uuid,
        kind: ContentKind,
        id: Uuid,
        archived: bool,
    ) -> AppResult<ContentItem> {
        let mut item = self.owned_item(viewer, kind, id).await?;
        item.is_archived = archived;
        item.updated_at = Utc::now();
        self.stores.content.update_content(&item).await?;
        Ok(item)
    }

    /// Delete an owned item with its comments, likes and saved references
    pub async fn delete(&self, viewer: Uuid, kind: ContentKind, id: Uuid) -> AppResult<()> {
        self.owned_item(viewer, kind, id).await?;
        if !self.stores.content.delete_content(id).await? {
            return Err(AppError::not_found(kind.resource_name()));
        }
        info!(owner = %viewer, id = %id, kind = kind.as_str(), "Content deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::domain::{Account, Comment, EngagementTarget, MediaType, NewAccount, TargetKind};
    use crate::error::ErrorKind;

    struct Fixture {
        stores: Stores,
        service: ContentService,
    }

    impl Fixture {
        fn new() -> Self {
            let stores = Stores::in_memory();
            let visibility = VisibilityEngine::new(stores.relationships.clone());
            let ledger = InteractionLedger::new(stores.clone(), visibility.clone());
            let feed = FeedAssembler::new(stores.clone(), visibility.clone(), FeedConfig::default());
            let service =
                ContentService::new(stores.clone(), visibility, ledger, feed, Duration::hours(24));
            Self { stores, service }
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
    }

    fn new_post() -> NewPost {
        NewPost {
            caption: "sunset".into(),
            images: vec!["/sunset.jpg".into()],
            location: Some("Beach".into()),
        }
    }

    #[tokio::test]
    async fn post_requires_an_image() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let err = fx
            .service
            .create_post(
                owner,
                NewPost {
                    caption: String::new(),
                    images: vec![],
                    location: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn private_post_visibility_follows_the_graph() {
        let fx = Fixture::new();
        let owner = fx.account("owner", true).await;
        let stranger = fx.account("stranger", false).await;
        let post = fx.service.create_post(owner, new_post()).await.unwrap();

        let err = fx.service.get_post(Some(stranger), post.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(fx.service.get_post(Some(owner), post.id).await.is_ok());

        fx.stores
            .relationships
            .insert_follow(stranger, owner, Utc::now())
            .await
            .unwrap();
        assert!(fx.service.get_post(Some(stranger), post.id).await.is_ok());
    }

    #[tokio::test]
    async fn only_owner_edits_and_archived_posts_hide() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let other = fx.account("other", false).await;
        let post = fx.service.create_post(owner, new_post()).await.unwrap();

        let update = ContentUpdate {
            caption: Some("new caption".into()),
            ..Default::default()
        };
        let err = fx
            .service
            .update_post(other, post.id, update.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let updated = fx.service.update_post(owner, post.id, update).await.unwrap();
        assert_eq!(updated.caption, "new caption");

        fx.service
            .archive(owner, ContentKind::Post, post.id, true)
            .await
            .unwrap();
        let err = fx.service.get_post(Some(other), post.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(fx.service.get_post(Some(owner), post.id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_cascades_engagement() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let fan = fx.account("fan", false).await;
        let post = fx.service.create_post(owner, new_post()).await.unwrap();
        let comment = Comment::new(fan, post.id, "wow", None, Utc::now());
        fx.stores.comments.insert_comment(&comment).await.unwrap();
        let target = EngagementTarget::new(TargetKind::Post, post.id);
        fx.stores.engagement.add_like(target, fan, Utc::now()).await.unwrap();

        let err = fx
            .service
            .delete(fan, ContentKind::Post, post.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        fx.service
            .delete(owner, ContentKind::Post, post.id)
            .await
            .unwrap();

        assert!(fx.stores.comments.get_comment(comment.id).await.unwrap().is_none());
        assert_eq!(fx.stores.engagement.like_count(target).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn story_fetch_records_viewer_once() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let viewer = fx.account("viewer", false).await;
        let story = fx
            .service
            .create_story(
                owner,
                NewStory {
                    media_url: "/s.jpg".into(),
                    media_type: MediaType::Image,
                    caption: String::new(),
                },
            )
            .await
            .unwrap();

        let entry = fx.service.get_story(Some(viewer), story.id).await.unwrap();
        assert!(entry.viewed);
        assert_eq!(entry.story.story_viewers().len(), 1);
        let entry = fx.service.get_story(Some(viewer), story.id).await.unwrap();
        assert_eq!(entry.story.story_viewers().len(), 1);
        let entry = fx.service.get_story(Some(owner), story.id).await.unwrap();
        assert_eq!(entry.story.story_viewers().len(), 1);
    }

    #[tokio::test]
    async fn reel_fetch_counts_views() {
        let fx = Fixture::new();
        let owner = fx.account("owner", false).await;
        let reel = fx
            .service
            .create_reel(
                owner,
                NewReel {
                    video_url: "/v.mp4".into(),
                    thumbnail_url: "/t.jpg".into(),
                    caption: String::new(),
                    audio_name: None,
                },
            )
            .await
            .unwrap();

        fx.service.get_reel(None, reel.id).await.unwrap();
        let fetched = fx.service.get_reel(None, reel.id).await.unwrap();
        match fetched.item.body {
            ContentBody::Reel { views, .. } => assert_eq!(views, 2),
            other => panic!("unexpected body {other:?}"),
        }
    }
}
