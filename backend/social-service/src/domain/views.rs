//! Read models returned by the feed assembler and glue services.
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::models::{Account, Comment, ContentItem, Message};

/// Minimal public projection of an account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub profile_image: String,
    pub is_verified: bool,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            full_name: account.full_name.clone(),
            profile_image: account.profile_image.clone(),
            is_verified: account.is_verified,
        }
    }
}

/// Content item with viewer-specific engagement annotations
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedContent {
    #[serde(flatten)]
    pub item: ContentItem,
    pub owner: AccountSummary,
    pub is_liked: bool,
    pub is_saved: bool,
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryEntry {
    #[serde(flatten)]
    pub story: ContentItem,
    pub viewed: bool,
}

/// Active stories of one owner, as shown in the story tray
#[derive(Debug, Clone, Serialize)]
pub struct StoryGroup {
    pub owner: AccountSummary,
    pub stories: Vec<StoryEntry>,
    pub all_viewed: bool,
}

impl StoryGroup {
    pub fn newest_at(&self) -> Option<DateTime<Utc>> {
        self.stories.iter().map(|s| s.story.created_at).max()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub account: AccountSummary,
    pub bio: String,
    pub website: String,
    pub is_private: bool,
    pub followers_count: i64,
    pub following_count: i64,
    pub posts_count: i64,
    pub is_following: bool,
    pub is_own_profile: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSummary {
    #[serde(flatten)]
    pub account: AccountSummary,
    pub is_online: bool,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastMessageSummary {
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    pub is_sent: bool,
}

/// Inbox row. Direct conversations carry exactly one other participant.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub participants: Vec<ParticipantSummary>,
    pub last_message: Option<LastMessageSummary>,
    pub unread_count: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub is_sent: bool,
    /// Read by at least one participant other than the sender
    pub is_read: bool,
}

impl MessageView {
    pub fn for_viewer(message: Message, viewer: Uuid) -> Self {
        let is_read = message.read_by.iter().any(|r| r.user_id != message.sender_id);
        Self {
            is_sent: message.sender_id == viewer,
            is_read,
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    pub id: Uuid,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub group_admin: Option<Uuid>,
    pub participants: Vec<ParticipantSummary>,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: AccountSummary,
    pub is_liked: bool,
    pub like_count: i64,
}

/// Top-level comment with its (single level of) replies, oldest first
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: AnnotatedComment,
    pub replies: Vec<AnnotatedComment>,
}
