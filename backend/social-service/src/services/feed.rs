use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::interactions::InteractionLedger;
use super::visibility::VisibilityEngine;
use crate::config::FeedConfig;
use crate::domain::{
    Account, AccountSummary, AnnotatedContent, ContentItem, ContentKind, ConversationSummary,
    EngagementTarget, Engageable, LastMessageSummary, ParticipantSummary, StoryEntry, StoryGroup,
};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::repository::{ContentQuery, Stores};

/// Builds the per-viewer read models: feeds, story tray, inbox and profile grids
#[derive(Clone)]
pub struct FeedAssembler {
    stores: Stores,
    visibility: VisibilityEngine,
    config: FeedConfig,
}

impl FeedAssembler {
    pub fn new(stores: Stores, visibility: VisibilityEngine, config: FeedConfig) -> Self {
        Self {
            stores,
            visibility,
            config,
        }
    }

    async fn following_set(&self, viewer: Uuid) -> AppResult<HashSet<Uuid>> {
        Ok(self
            .stores
            .relationships
            .following(viewer)
            .await?
            .into_iter()
            .collect())
    }

    /// `{viewer} ∪ following(viewer)`
    async fn circle(&self, viewer: Uuid) -> AppResult<HashSet<Uuid>> {
        let mut circle = self.following_set(viewer).await?;
        circle.insert(viewer);
        Ok(circle)
    }

    /// Posts from the viewer and the accounts they follow, newest first
    pub async fn home_feed(&self, viewer: Uuid) -> AppResult<Vec<AnnotatedContent>> {
        let circle = self.circle(viewer).await?;
        let items = self
            .stores
            .content
            .find(&ContentQuery::of(ContentKind::Post).owned_by(circle))
            .await?;
        let feed = self.annotate(Some(viewer), items).await?;
        metrics::record_feed("home", feed.len());
        Ok(feed)
    }

    /// Posts from public accounts outside the viewer's circle, newest first.
    /// The privacy filter runs in the store before the page cap.
    pub async fn explore_feed(&self, viewer: Option<Uuid>) -> AppResult<Vec<AnnotatedContent>> {
        let excluded = match viewer {
            Some(viewer_id) => self.circle(viewer_id).await?,
            None => HashSet::new(),
        };
        let query = ContentQuery::of(ContentKind::Post)
            .not_owned_by(excluded)
            .public_owners_only()
            .limit(self.config.explore_page_size);
        let items = self.stores.content.find(&query).await?;
        let feed = self.annotate(viewer, items).await?;
        metrics::record_feed("explore", feed.len());
        Ok(feed)
    }

    /// Reels from every owner the viewer may see, newest first
    pub async fn reels_feed(&self, viewer: Option<Uuid>) -> AppResult<Vec<AnnotatedContent>> {
        let items = self
            .stores
            .content
            .find(&ContentQuery::of(ContentKind::Reel))
            .await?;
        let items = self.filter_visible(viewer, items).await?;
        let feed = self.annotate(viewer, items).await?;
        metrics::record_feed("reels", feed.len());
        Ok(feed)
    }

    /// Active stories of the viewer's circle grouped per owner.
    /// Groups are ordered by their newest story; stories within a group oldest first.
    pub async fn story_tray(&self, viewer: Uuid) -> AppResult<Vec<StoryGroup>> {
        let now = Utc::now();
        let circle = self.circle(viewer).await?;
        let stories = self
            .stores
            .content
            .find(
                &ContentQuery::of(ContentKind::Story)
                    .owned_by(circle)
                    .active_at(now),
            )
            .await?;

        let mut by_owner: HashMap<Uuid, Vec<ContentItem>> = HashMap::new();
        for story in stories {
            by_owner.entry(story.owner_id).or_default().push(story);
        }
        let owner_ids: Vec<Uuid> = by_owner.keys().copied().collect();
        let owners = self.stores.accounts.get_accounts(&owner_ids).await?;

        let mut groups: Vec<StoryGroup> = by_owner
            .into_iter()
            .filter_map(|(owner_id, mut stories)| {
                let owner = owners.get(&owner_id)?;
                stories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                let stories: Vec<StoryEntry> = stories
                    .into_iter()
                    .map(|story| StoryEntry {
                        viewed: owner_id == viewer || story.viewed_by(viewer),
                        story,
                    })
                    .collect();
                let all_viewed = stories.iter().all(|s| s.viewed);
                Some(StoryGroup {
                    owner: AccountSummary::from(owner),
                    stories,
                    all_viewed,
                })
            })
            .collect();
        groups.sort_by(|a, b| b.newest_at().cmp(&a.newest_at()).then(a.owner.id.cmp(&b.owner.id)));

        metrics::record_feed("stories", groups.len());
        Ok(groups)
    }

    /// Active conversations of the viewer, most recently updated first
    pub async fn conversation_list(&self, viewer: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let now = Utc::now();
        let window = self.config.online_window();
        let conversations = self.stores.messaging.conversations_for(viewer).await?;

        let other_ids: Vec<Uuid> = conversations
            .iter()
            .flat_map(|c| c.others(viewer))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let accounts = self.stores.accounts.get_accounts(&other_ids).await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let participants: Vec<ParticipantSummary> = conversation
                .others(viewer)
                .filter_map(|id| accounts.get(&id))
                .map(|account| ParticipantSummary {
                    account: AccountSummary::from(account),
                    is_online: account.is_online(now, window),
                    last_active: account.last_active,
                })
                .collect();

            let last_message = match conversation.last_message_id {
                Some(id) => self.stores.messaging.get_message(id).await?,
                None => None,
            };
            let unread_count = match &last_message {
                Some(message) if InteractionLedger::is_unread(viewer, message) => 1,
                _ => 0,
            };

            summaries.push(ConversationSummary {
                id: conversation.id,
                is_group: conversation.is_group,
                group_name: conversation.group_name.clone(),
                participants,
                last_message: last_message.map(|message| LastMessageSummary {
                    is_read: message.is_read_by(viewer),
                    is_sent: message.sender_id == viewer,
                    timestamp: message.created_at,
                    text: message.text,
                }),
                unread_count,
                updated_at: conversation.updated_at,
            });
        }

        metrics::record_feed("conversations", summaries.len());
        Ok(summaries)
    }

    /// Owner's grid of `kind`, gated by the visibility policy
    async fn profile_grid(
        &self,
        viewer: Option<Uuid>,
        username: &str,
        kind: ContentKind,
    ) -> AppResult<Vec<ContentItem>> {
        let owner = self.profile_owner(viewer, username).await?;
        let mut query = ContentQuery::of(kind).owned_by([owner.id]);
        if kind == ContentKind::Story {
            query = query.active_at(Utc::now());
        }
        self.stores.content.find(&query).await
    }

    async fn profile_owner(&self, viewer: Option<Uuid>, username: &str) -> AppResult<Account> {
        let owner = self
            .stores
            .accounts
            .get_by_username(username)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        self.visibility.ensure_can_view(viewer, &owner).await?;
        Ok(owner)
    }

    pub async fn profile_posts(
        &self,
        viewer: Option<Uuid>,
        username: &str,
    ) -> AppResult<Vec<AnnotatedContent>> {
        let items = self.profile_grid(viewer, username, ContentKind::Post).await?;
        self.annotate(viewer, items).await
    }

    pub async fn profile_reels(
        &self,
        viewer: Option<Uuid>,
        username: &str,
    ) -> AppResult<Vec<AnnotatedContent>> {
        let items = self.profile_grid(viewer, username, ContentKind::Reel).await?;
        self.annotate(viewer, items).await
    }

    /// Active stories of one owner, oldest first
    pub async fn profile_stories(
        &self,
        viewer: Option<Uuid>,
        username: &str,
    ) -> AppResult<Vec<StoryEntry>> {
        let mut stories = self.profile_grid(viewer, username, ContentKind::Story).await?;
        stories.reverse();
        Ok(stories
            .into_iter()
            .map(|story| StoryEntry {
                viewed: viewer.map_or(false, |v| v == story.owner_id || story.viewed_by(v)),
                story,
            })
            .collect())
    }

    /// Saved content the viewer can still see, most recently saved first
    pub async fn saved_posts(&self, viewer: Uuid) -> AppResult<Vec<AnnotatedContent>> {
        let now = Utc::now();
        let mut items = Vec::new();
        for id in self.stores.engagement.saved_ids(viewer).await? {
            if let Some(item) = self.stores.content.get_content(id).await? {
                let hidden_archive = item.is_archived && item.owner_id != viewer;
                if item.is_active_at(now) && !hidden_archive {
                    items.push(item);
                }
            }
        }
        let items = self.filter_visible(Some(viewer), items).await?;
        let feed = self.annotate(Some(viewer), items).await?;
        metrics::record_feed("saved", feed.len());
        Ok(feed)
    }

    /// Drop items whose owner the viewer may not see
    async fn filter_visible(
        &self,
        viewer: Option<Uuid>,
        items: Vec<ContentItem>,
    ) -> AppResult<Vec<ContentItem>> {
        let owner_ids: Vec<Uuid> = items
            .iter()
            .map(|i| i.owner_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let owners = self.stores.accounts.get_accounts(&owner_ids).await?;
        let following = match viewer {
            Some(viewer_id) => self.following_set(viewer_id).await?,
            None => HashSet::new(),
        };
        let before = items.len();
        let visible: Vec<ContentItem> = items
            .into_iter()
            .filter(|item| {
                owners
                    .get(&item.owner_id)
                    .map_or(false, |owner| VisibilityEngine::visible_with(viewer, owner, &following))
            })
            .collect();
        if visible.len() != before {
            debug!(viewer = ?viewer, hidden = before - visible.len(), "Filtered private content");
        }
        Ok(visible)
    }

    /// Attach owner summary, like/save state and counts. Anonymous viewers get
    /// `is_liked = is_saved = false`. Items whose owner no longer exists are dropped.
    pub async fn annotate(
        &self,
        viewer: Option<Uuid>,
        items: Vec<ContentItem>,
    ) -> AppResult<Vec<AnnotatedContent>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let owner_ids: Vec<Uuid> = items
            .iter()
            .map(|i| i.owner_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let owners = self.stores.accounts.get_accounts(&owner_ids).await?;
        let targets: Vec<EngagementTarget> = items.iter().map(|i| i.engagement_target()).collect();

        let (liked, saved) = match viewer {
            Some(viewer_id) => (
                self.stores.engagement.liked_by(viewer_id, &targets).await?,
                self.stores
                    .engagement
                    .saved_ids(viewer_id)
                    .await?
                    .into_iter()
                    .collect::<HashSet<Uuid>>(),
            ),
            None => (HashSet::new(), HashSet::new()),
        };

        let mut annotated = Vec::with_capacity(items.len());
        for item in items {
            let Some(owner) = owners.get(&item.owner_id) else {
                continue;
            };
            let target = item.engagement_target();
            annotated.push(AnnotatedContent {
                owner: AccountSummary::from(owner),
                is_liked: liked.contains(&target),
                is_saved: saved.contains(&item.id),
                like_count: self.stores.engagement.like_count(target).await?,
                comment_count: self.stores.comments.comment_count(item.id).await?,
                item,
            });
        }
        Ok(annotated)
    }
}
