use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::visibility::VisibilityEngine;
use crate::domain::{
    Account, AccountSummary, AnnotatedComment, Comment, CommentInput, CommentThread, ContentItem,
    EngagementTarget, Engageable,
};
use crate::error::{AppError, AppResult};
use crate::repository::Stores;

/// Two-level comment threads on content items
#[derive(Clone)]
pub struct CommentService {
    stores: Stores,
    visibility: VisibilityEngine,
}

impl CommentService {
    pub fn new(stores: Stores, visibility: VisibilityEngine) -> Self {
        Self { stores, visibility }
    }

    /// Live content item the viewer may see
    async fn visible_content(&self, viewer: Option<Uuid>, content_id: Uuid) -> AppResult<ContentItem> {
        let item = self
            .stores
            .content
            .get_content(content_id)
            .await?
            .filter(|item| item.is_active_at(Utc::now()))
            .filter(|item| !item.is_archived || viewer == Some(item.owner_id))
            .ok_or_else(|| AppError::not_found("Content"))?;
        let owner = self.owner(item.owner_id).await?;
        self.visibility.ensure_can_view(viewer, &owner).await?;
        Ok(item)
    }

    async fn owner(&self, id: Uuid) -> AppResult<Account> {
        self.stores
            .accounts
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    async fn require_comment(&self, id: Uuid) -> AppResult<Comment> {
        self.stores
            .comments
            .get_comment(id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))
    }

    async fn insert(
        &self,
        viewer: Uuid,
        content_id: Uuid,
        parent_id: Option<Uuid>,
        input: CommentInput,
    ) -> AppResult<AnnotatedComment> {
        input.validate()?;
        if input.text.trim().is_empty() {
            return Err(AppError::validation("comment text must not be blank"));
        }
        let comment = Comment::new(viewer, content_id, &input.text, parent_id, Utc::now());
        self.stores.comments.insert_comment(&comment).await?;
        info!(author = %viewer, content = %content_id, comment = %comment.id, "Comment created");

        let author = self.owner(viewer).await?;
        Ok(AnnotatedComment {
            comment,
            author: AccountSummary::from(&author),
            is_liked: false,
            like_count: 0,
        })
    }

    pub async fn create(
        &self,
        viewer: Uuid,
        content_id: Uuid,
        input: CommentInput,
    ) -> AppResult<AnnotatedComment> {
        self.visible_content(Some(viewer), content_id).await?;
        self.insert(viewer, content_id, None, input).await
    }

    /// Reply to a comment. Replying to a reply attaches to its top-level parent.
    pub async fn reply(
        &self,
        viewer: Uuid,
        comment_id: Uuid,
        input: CommentInput,
    ) -> AppResult<AnnotatedComment> {
        let target = self.require_comment(comment_id).await?;
        let top_level = target.parent_id.unwrap_or(target.id);
        self.visible_content(Some(viewer), target.content_id).await?;
        self.insert(viewer, target.content_id, Some(top_level), input)
            .await
    }

    /// Top-level comments oldest first, each with its replies oldest first
    pub async fn list(&self, viewer: Option<Uuid>, content_id: Uuid) -> AppResult<Vec<CommentThread>> {
        self.visible_content(viewer, content_id).await?;

        let top_level = self.stores.comments.top_level_comments(content_id).await?;
        let mut threads_raw = Vec::with_capacity(top_level.len());
        for comment in top_level {
            let replies = self.stores.comments.replies(comment.id).await?;
            threads_raw.push((comment, replies));
        }

        let all: Vec<&Comment> = threads_raw
            .iter()
            .flat_map(|(c, replies)| std::iter::once(c).chain(replies.iter()))
            .collect();
        let author_ids: Vec<Uuid> = all
            .iter()
            .map(|c| c.owner_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let authors = self.stores.accounts.get_accounts(&author_ids).await?;
        let targets: Vec<EngagementTarget> = all.iter().map(|c| c.engagement_target()).collect();
        let liked = match viewer {
            Some(viewer_id) => self.stores.engagement.liked_by(viewer_id, &targets).await?,
            None => HashSet::new(),
        };

        let mut threads = Vec::with_capacity(threads_raw.len());
        for (comment, replies) in threads_raw {
            let Some(head) = self.annotate(comment, &authors, &liked).await? else {
                continue;
            };
            let mut annotated_replies = Vec::with_capacity(replies.len());
            for reply in replies {
                if let Some(reply) = self.annotate(reply, &authors, &liked).await? {
                    annotated_replies.push(reply);
                }
            }
            threads.push(CommentThread {
                comment: head,
                replies: annotated_replies,
            });
        }
        Ok(threads)
    }

    async fn annotate(
        &self,
        comment: Comment,
        authors: &HashMap<Uuid, Account>,
        liked: &HashSet<EngagementTarget>,
    ) -> AppResult<Option<AnnotatedComment>> {
        let Some(author) = authors.get(&comment.owner_id) else {
            return Ok(None);
        };
        let target = comment.engagement_target();
        Ok(Some(AnnotatedComment {
            author: AccountSummary::from(author),
            is_liked: liked.contains(&target),
            like_count: self.stores.engagement.like_count(target).await?,
            comment,
        }))
    }

    /// Author-only text edit
    pub async fn update(&self, viewer: Uuid, id: Uuid, input: CommentInput) -> AppResult<Comment> {
        input.validate()?;
        let comment = self.require_comment(id).await?;
        if comment.owner_id != viewer {
            return Err(AppError::forbidden("Only the author can edit this comment"));
        }
        let text = input.text.trim();
        if text.is_empty() {
            return Err(AppError::validation("comment text must not be blank"));
        }
        self.stores
            .comments
            .update_comment_text(id, text, Utc::now())
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))
    }

    /// The author or the owner of the commented item may delete.
    /// Deleting a top-level comment removes its replies.
    pub async fn delete(&self, viewer: Uuid, id: Uuid) -> AppResult<()> {
        let comment = self.require_comment(id).await?;
        if comment.owner_id != viewer {
            let content_owner = self
                .stores
                .content
                .get_content(comment.content_id)
                .await?
                .map(|item| item.owner_id);
            if content_owner != Some(viewer) {
                return Err(AppError::forbidden("Not allowed to delete this comment"));
            }
        }
        self.stores.comments.delete_comment(id).await?;
        info!(viewer = %viewer, comment = %id, "Comment deleted");
        Ok(())
    }
}
