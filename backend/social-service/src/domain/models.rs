use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_PROFILE_IMAGE: &str = "default-profile.jpg";
pub const DEFAULT_AUDIO_NAME: &str = "Original Audio";
pub const DELETED_MESSAGE_TEXT: &str = "This message has been deleted";

// ============================================================================
// Accounts
// ============================================================================

/// Account entity. Follow edges and saved content live in their own stores.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub email: String,
    pub full_name: String,
    pub profile_image: String,
    pub bio: String,
    pub website: String,
    pub is_verified: bool,
    pub is_private: bool,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(input: NewAccount, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: input.username.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            full_name: input.full_name.trim().to_string(),
            profile_image: DEFAULT_PROFILE_IMAGE.to_string(),
            bio: String::new(),
            website: String::new(),
            is_verified: false,
            is_private: input.is_private,
            last_active: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Presence heuristic: active within `window` of `now`
    pub fn is_online(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_active > now - window
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAccount {
    #[validate(length(min = 3, max = 30))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 100))]
    pub full_name: Option<String>,
    #[validate(length(max = 150))]
    pub bio: Option<String>,
    #[validate(length(max = 200))]
    pub website: Option<String>,
    #[validate(length(min = 1))]
    pub profile_image: Option<String>,
}

/// Follower/following totals derived from the follow edge set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowCounts {
    pub followers: i64,
    pub following: i64,
}

// ============================================================================
// Content (posts, reels, stories)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Reel,
    Story,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Reel => "reel",
            ContentKind::Story => "story",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "post" => Some(ContentKind::Post),
            "reel" => Some(ContentKind::Reel),
            "story" => Some(ContentKind::Story),
            _ => None,
        }
    }

    pub fn resource_name(&self) -> &'static str {
        match self {
            ContentKind::Post => "Post",
            ContentKind::Reel => "Reel",
            ContentKind::Story => "Story",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            "audio" => Some(MediaType::Audio),
            _ => None,
        }
    }
}

/// A single story view receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryView {
    pub viewer_id: Uuid,
    pub viewed_at: DateTime<Utc>,
}

/// Variant-specific fields of a content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentBody {
    Post {
        images: Vec<String>,
        location: String,
    },
    Reel {
        video_url: String,
        thumbnail_url: String,
        audio_name: String,
        views: i64,
        shares: i64,
    },
    Story {
        media_url: String,
        media_type: MediaType,
        expires_at: DateTime<Utc>,
        viewers: Vec<StoryView>,
    },
}

/// Post, reel or story. Engagement (likes, comments) is tracked by the
/// engagement and comment stores, keyed by the item's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub caption: String,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: ContentBody,
}

impl ContentItem {
    pub fn new_post(owner_id: Uuid, input: NewPost, now: DateTime<Utc>) -> Self {
        Self::with_body(
            owner_id,
            input.caption,
            now,
            ContentBody::Post {
                images: input.images,
                location: input.location.unwrap_or_default(),
            },
        )
    }

    pub fn new_reel(owner_id: Uuid, input: NewReel, now: DateTime<Utc>) -> Self {
        Self::with_body(
            owner_id,
            input.caption,
            now,
            ContentBody::Reel {
                video_url: input.video_url,
                thumbnail_url: input.thumbnail_url,
                audio_name: input
                    .audio_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_AUDIO_NAME.to_string()),
                views: 0,
                shares: 0,
            },
        )
    }

    pub fn new_story(owner_id: Uuid, input: NewStory, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self::with_body(
            owner_id,
            input.caption,
            now,
            ContentBody::Story {
                media_url: input.media_url,
                media_type: input.media_type,
                expires_at: now + ttl,
                viewers: Vec::new(),
            },
        )
    }

    fn with_body(owner_id: Uuid, caption: String, now: DateTime<Utc>, body: ContentBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            caption,
            is_archived: false,
            created_at: now,
            updated_at: now,
            body,
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self.body {
            ContentBody::Post { .. } => ContentKind::Post,
            ContentBody::Reel { .. } => ContentKind::Reel,
            ContentBody::Story { .. } => ContentKind::Story,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match &self.body {
            ContentBody::Story { expires_at, .. } => Some(*expires_at),
            _ => None,
        }
    }

    /// Stories are active until `expires_at`; other kinds never expire.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(true, |expires_at| expires_at > now)
    }

    pub fn story_viewers(&self) -> &[StoryView] {
        match &self.body {
            ContentBody::Story { viewers, .. } => viewers,
            _ => &[],
        }
    }

    pub fn viewed_by(&self, viewer_id: Uuid) -> bool {
        self.story_viewers().iter().any(|v| v.viewer_id == viewer_id)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPost {
    #[serde(default)]
    #[validate(length(max = 2200))]
    pub caption: String,
    #[validate(length(min = 1, max = 10, message = "between 1 and 10 images are required"))]
    pub images: Vec<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewReel {
    #[validate(length(min = 1, message = "video is required"))]
    pub video_url: String,
    #[validate(length(min = 1, message = "thumbnail is required"))]
    pub thumbnail_url: String,
    #[serde(default)]
    #[validate(length(max = 2200))]
    pub caption: String,
    pub audio_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewStory {
    #[validate(length(min = 1, message = "media is required"))]
    pub media_url: String,
    pub media_type: MediaType,
    #[serde(default)]
    #[validate(length(max = 2200))]
    pub caption: String,
}

/// Owner edit of a post or reel; fields not applicable to the kind are ignored
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ContentUpdate {
    #[validate(length(max = 2200))]
    pub caption: Option<String>,
    pub location: Option<String>,
    pub audio_name: Option<String>,
}

// ============================================================================
// Engagement
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Reel,
    Story,
    Comment,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Post => "post",
            TargetKind::Reel => "reel",
            TargetKind::Story => "story",
            TargetKind::Comment => "comment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "post" => Some(TargetKind::Post),
            "reel" => Some(TargetKind::Reel),
            "story" => Some(TargetKind::Story),
            "comment" => Some(TargetKind::Comment),
            _ => None,
        }
    }
}

impl From<ContentKind> for TargetKind {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Post => TargetKind::Post,
            ContentKind::Reel => TargetKind::Reel,
            ContentKind::Story => TargetKind::Story,
        }
    }
}

/// Something that can be liked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngagementTarget {
    pub kind: TargetKind,
    pub id: Uuid,
}

impl EngagementTarget {
    pub fn new(kind: TargetKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

/// Shared engagement capability of content items and comments
pub trait Engageable {
    fn engagement_target(&self) -> EngagementTarget;
    fn owner_id(&self) -> Uuid;
}

impl Engageable for ContentItem {
    fn engagement_target(&self) -> EngagementTarget {
        EngagementTarget::new(self.kind().into(), self.id)
    }

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }
}

impl Engageable for Comment {
    fn engagement_target(&self) -> EngagementTarget {
        EngagementTarget::new(TargetKind::Comment, self.id)
    }

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }
}

// ============================================================================
// Comments
// ============================================================================

/// Comment entity. `parent_id` is set on replies; replies never nest deeper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub content_id: Uuid,
    pub text: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        owner_id: Uuid,
        content_id: Uuid,
        text: &str,
        parent_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            content_id,
            text: text.trim().to_string(),
            parent_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CommentInput {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
}

// ============================================================================
// Messaging
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    /// Sorted ascending so a direct pair has one canonical representation
    pub participants: Vec<Uuid>,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub group_admin: Option<Uuid>,
    pub last_message_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn direct(a: Uuid, b: Uuid, now: DateTime<Utc>) -> Self {
        Self::build(vec![a, b], false, None, None, now)
    }

    pub fn group(admin: Uuid, members: Vec<Uuid>, name: String, now: DateTime<Utc>) -> Self {
        Self::build(members, true, Some(name), Some(admin), now)
    }

    fn build(
        mut participants: Vec<Uuid>,
        is_group: bool,
        group_name: Option<String>,
        group_admin: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        participants.sort();
        participants.dedup();
        Self {
            id: Uuid::new_v4(),
            participants,
            is_group,
            group_name,
            group_admin,
            last_message_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn others(&self, user_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.participants.iter().copied().filter(move |id| *id != user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<MediaType>,
    pub read_by: Vec<ReadReceipt>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// New message; the sender counts as its first reader
    pub fn new(conversation_id: Uuid, sender_id: Uuid, input: MessageInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            text: input.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            media_url: input.media_url,
            media_type: input.media_type,
            read_by: vec![ReadReceipt {
                user_id: sender_id,
                read_at: now,
            }],
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MessageInput {
    #[validate(length(max = 5000))]
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<MediaType>,
}

impl MessageInput {
    pub fn has_content(&self) -> bool {
        let has_text = self.text.as_deref().map_or(false, |t| !t.trim().is_empty());
        let has_media = self.media_url.as_deref().map_or(false, |m| !m.is_empty());
        has_text || has_media
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewGroup {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1))]
    pub participants: Vec<Uuid>,
}
