use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{
    AccountStore, CommentStore, ContentQuery, ContentStore, EngagementStore, MessagingStore,
    OwnerFilter, RelationshipStore,
};
use crate::domain::{
    Account, Comment, ContentBody, ContentItem, ContentKind, Conversation, EngagementTarget,
    FollowCounts, MediaType, Message, ProfileUpdate, ReadReceipt, StoryView, TargetKind,
};
use crate::error::{AppError, AppResult};

const ACCOUNT_COLUMNS: &str = "id, username, email, full_name, profile_image, bio, website, \
     is_verified, is_private, last_active, created_at, updated_at";

const CONTENT_COLUMNS: &str = "c.id, c.owner_id, c.kind, c.caption, c.is_archived, c.images, \
     c.location, c.video_url, c.thumbnail_url, c.audio_name, c.views, c.shares, c.media_url, \
     c.media_type, c.expires_at, c.created_at, c.updated_at";

const COMMENT_COLUMNS: &str = "id, owner_id, content_id, text, parent_id, created_at, updated_at";

const CONVERSATION_COLUMNS: &str = "id, participants, is_group, group_name, group_admin, \
     last_message_id, is_active, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, text, media_url, media_type, is_deleted, created_at, updated_at";

/// Translate constraint violations into domain errors
fn map_write_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => {
                let message = match db_err.constraint() {
                    Some(c) if c.contains("username") => "username already taken",
                    Some(c) if c.contains("email") => "email already registered",
                    _ => "duplicate record",
                };
                return AppError::validation(message);
            }
            Some("23503") => return AppError::not_found("Referenced resource"),
            _ => {}
        }
    }
    AppError::Database(err)
}

/// Escape LIKE wildcards in user input
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[derive(sqlx::FromRow)]
struct ContentRow {
    id: Uuid,
    owner_id: Uuid,
    kind: String,
    caption: String,
    is_archived: bool,
    images: Vec<String>,
    location: String,
    video_url: Option<String>,
    thumbnail_url: Option<String>,
    audio_name: Option<String>,
    views: i64,
    shares: i64,
    media_url: Option<String>,
    media_type: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ContentRow {
    fn into_item(self, viewers: Vec<StoryView>) -> AppResult<ContentItem> {
        let kind = ContentKind::parse(&self.kind)
            .ok_or_else(|| AppError::Internal(format!("unknown content kind {}", self.kind)))?;
        let body = match kind {
            ContentKind::Post => ContentBody::Post {
                images: self.images,
                location: self.location,
            },
            ContentKind::Reel => ContentBody::Reel {
                video_url: self.video_url.unwrap_or_default(),
                thumbnail_url: self.thumbnail_url.unwrap_or_default(),
                audio_name: self.audio_name.unwrap_or_default(),
                views: self.views,
                shares: self.shares,
            },
            ContentKind::Story => ContentBody::Story {
                media_url: self.media_url.unwrap_or_default(),
                media_type: self
                    .media_type
                    .as_deref()
                    .and_then(MediaType::parse)
                    .unwrap_or(MediaType::Image),
                expires_at: self.expires_at.unwrap_or(self.created_at),
                viewers,
            },
        };
        Ok(ContentItem {
            id: self.id,
            owner_id: self.owner_id,
            caption: self.caption,
            is_archived: self.is_archived,
            created_at: self.created_at,
            updated_at: self.updated_at,
            body,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    text: Option<String>,
    media_url: Option<String>,
    media_type: Option<String>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self, read_by: Vec<ReadReceipt>) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            text: self.text,
            media_url: self.media_url,
            media_type: self.media_type.as_deref().and_then(MediaType::parse),
            read_by,
            is_deleted: self.is_deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// PostgreSQL adapter for every store trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Health check
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn story_viewers(&self, story_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<StoryView>>> {
        if story_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>)>(
            r#"
            SELECT story_id, viewer_id, viewed_at
            FROM story_views
            WHERE story_id = ANY($1)
            ORDER BY viewed_at ASC
            "#,
        )
        .bind(story_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut viewers: HashMap<Uuid, Vec<StoryView>> = HashMap::new();
        for (story_id, viewer_id, viewed_at) in rows {
            viewers.entry(story_id).or_default().push(StoryView {
                viewer_id,
                viewed_at,
            });
        }
        Ok(viewers)
    }

    async fn hydrate_content(&self, rows: Vec<ContentRow>) -> AppResult<Vec<ContentItem>> {
        let story_ids: Vec<Uuid> = rows
            .iter()
            .filter(|r| r.kind == ContentKind::Story.as_str())
            .map(|r| r.id)
            .collect();
        let mut viewers = self.story_viewers(&story_ids).await?;
        rows.into_iter()
            .map(|row| {
                let story_viewers = viewers.remove(&row.id).unwrap_or_default();
                row.into_item(story_viewers)
            })
            .collect()
    }

    async fn read_receipts(&self, message_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<ReadReceipt>>> {
        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>)>(
            r#"
            SELECT message_id, user_id, read_at
            FROM message_reads
            WHERE message_id = ANY($1)
            ORDER BY read_at ASC
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut receipts: HashMap<Uuid, Vec<ReadReceipt>> = HashMap::new();
        for (message_id, user_id, read_at) in rows {
            receipts
                .entry(message_id)
                .or_default()
                .push(ReadReceipt { user_id, read_at });
        }
        Ok(receipts)
    }

    async fn hydrate_messages(&self, rows: Vec<MessageRow>) -> AppResult<Vec<Message>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut receipts = self.read_receipts(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let read_by = receipts.remove(&row.id).unwrap_or_default();
                row.into_message(read_by)
            })
            .collect())
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, account: &Account) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, username, email, full_name, profile_image, bio, website,
                                  is_verified, is_private, last_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(account.id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.full_name)
        .bind(&account.profile_image)
        .bind(&account.bio)
        .bind(&account.website)
        .bind(account.is_verified)
        .bind(account.is_private)
        .bind(account.last_active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE LOWER(username) = LOWER($1)"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn get_accounts(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, Account>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts.into_iter().map(|a| (a.id, a)).collect())
    }

    async fn all_account_ids(&self) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM accounts ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn search_accounts(&self, query: &str, limit: usize) -> AppResult<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS} FROM accounts
            WHERE username ILIKE $1 OR full_name ILIKE $1
            ORDER BY username ASC
            LIMIT $2
            "#
        ))
        .bind(like_pattern(query))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE accounts
            SET full_name = COALESCE($2, full_name),
                bio = COALESCE($3, bio),
                website = COALESCE($4, website),
                profile_image = COALESCE($5, profile_image),
                updated_at = $6
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.full_name.as_deref())
        .bind(update.bio.as_deref())
        .bind(update.website.as_deref())
        .bind(update.profile_image.as_deref())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn set_privacy(&self, id: Uuid, is_private: bool, now: DateTime<Utc>) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE accounts SET is_private = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(is_private)
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_active(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE accounts SET last_active = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for PgStore {
    async fn insert_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO follows (follower_id, followee_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        let created = result.rows_affected() > 0;
        debug!(follower = %follower_id, followee = %followee_id, created, "Follow edge insert");
        Ok(created)
    }

    async fn remove_follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM follows
            WHERE follower_id = $1 AND followee_id = $2
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM follows
                WHERE follower_id = $1 AND followee_id = $2
            )
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn following(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT followee_id FROM follows
            WHERE follower_id = $1
            ORDER BY created_at DESC, followee_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn followers(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT follower_id FROM follows
            WHERE followee_id = $1
            ORDER BY created_at DESC, follower_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn follow_counts(&self, user_id: Uuid) -> AppResult<FollowCounts> {
        let (followers, following) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM follows WHERE followee_id = $1),
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(FollowCounts {
            followers,
            following,
        })
    }
}

/// FROM and WHERE clauses shared by content listing and counting
fn push_content_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ContentQuery) {
    let kinds: Vec<&str> = query.kinds.iter().map(|k| k.as_str()).collect();

    qb.push(" FROM content_items c");
    if query.public_owners_only {
        qb.push(" JOIN accounts a ON a.id = c.owner_id AND NOT a.is_private");
    }
    qb.push(" WHERE c.kind = ANY(");
    qb.push_bind(kinds);
    qb.push(")");

    match &query.owners {
        OwnerFilter::Any => {}
        OwnerFilter::In(owners) => {
            qb.push(" AND c.owner_id = ANY(");
            qb.push_bind(owners.iter().copied().collect::<Vec<Uuid>>());
            qb.push(")");
        }
        OwnerFilter::NotIn(owners) => {
            qb.push(" AND NOT (c.owner_id = ANY(");
            qb.push_bind(owners.iter().copied().collect::<Vec<Uuid>>());
            qb.push("))");
        }
    }
    if !query.include_archived {
        qb.push(" AND NOT c.is_archived");
    }
    if let Some(now) = query.active_at {
        qb.push(" AND (c.expires_at IS NULL OR c.expires_at > ");
        qb.push_bind(now);
        qb.push(")");
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn insert_content(&self, item: &ContentItem) -> AppResult<()> {
        let mut images: &[String] = &[];
        let mut location: &str = "";
        let (mut video_url, mut thumbnail_url, mut audio_name) = (None, None, None);
        let (mut views, mut shares) = (0_i64, 0_i64);
        let (mut media_url, mut media_type, mut expires_at) = (None, None, None);

        match &item.body {
            ContentBody::Post {
                images: post_images,
                location: post_location,
            } => {
                images = post_images.as_slice();
                location = post_location.as_str();
            }
            ContentBody::Reel {
                video_url: v,
                thumbnail_url: t,
                audio_name: a,
                views: reel_views,
                shares: reel_shares,
            } => {
                video_url = Some(v.as_str());
                thumbnail_url = Some(t.as_str());
                audio_name = Some(a.as_str());
                views = *reel_views;
                shares = *reel_shares;
            }
            ContentBody::Story {
                media_url: m,
                media_type: mt,
                expires_at: e,
                ..
            } => {
                media_url = Some(m.as_str());
                media_type = Some(mt.as_str());
                expires_at = Some(*e);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO content_items (id, owner_id, kind, caption, is_archived, images, location,
                                       video_url, thumbnail_url, audio_name, views, shares,
                                       media_url, media_type, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(item.id)
        .bind(item.owner_id)
        .bind(item.kind().as_str())
        .bind(&item.caption)
        .bind(item.is_archived)
        .bind(images)
        .bind(location)
        .bind(video_url)
        .bind(thumbnail_url)
        .bind(audio_name)
        .bind(views)
        .bind(shares)
        .bind(media_url)
        .bind(media_type)
        .bind(expires_at)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn get_content(&self, id: Uuid) -> AppResult<Option<ContentItem>> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate_content(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_content(&self, item: &ContentItem) -> AppResult<()> {
        let (location, audio_name) = match &item.body {
            ContentBody::Post { location, .. } => (Some(location.as_str()), None),
            ContentBody::Reel { audio_name, .. } => (None, Some(audio_name.as_str())),
            ContentBody::Story { .. } => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET caption = $2,
                is_archived = $3,
                location = COALESCE($4, location),
                audio_name = COALESCE($5, audio_name),
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(&item.caption)
        .bind(item.is_archived)
        .bind(location)
        .bind(audio_name)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(item.kind().resource_name()));
        }
        Ok(())
    }

    async fn delete_content(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Likes are polymorphic and carry no foreign key
        sqlx::query(
            r#"
            DELETE FROM likes
            WHERE (target_kind <> 'comment' AND target_id = $1)
               OR (target_kind = 'comment'
                   AND target_id IN (SELECT id FROM comments WHERE content_id = $1))
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // comments, story_views and saved_content cascade
        let result = sqlx::query("DELETE FROM content_items WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, query: &ContentQuery) -> AppResult<Vec<ContentItem>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        qb.push(CONTENT_COLUMNS);
        push_content_filters(&mut qb, query);
        qb.push(" ORDER BY c.created_at DESC, c.id ASC");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb
            .build_query_as::<ContentRow>()
            .fetch_all(&self.pool)
            .await?;
        self.hydrate_content(rows).await
    }

    async fn count_content(&self, query: &ContentQuery) -> AppResult<i64> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*)");
        push_content_filters(&mut qb, query);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn purge_expired_stories(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM likes
            WHERE (target_kind = 'story' AND target_id IN (
                      SELECT id FROM content_items WHERE kind = 'story' AND expires_at <= $1))
               OR (target_kind = 'comment' AND target_id IN (
                      SELECT cm.id FROM comments cm
                      JOIN content_items c ON c.id = cm.content_id
                      WHERE c.kind = 'story' AND c.expires_at <= $1))
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let result =
            sqlx::query("DELETE FROM content_items WHERE kind = 'story' AND expires_at <= $1")
                .bind(now)
                .execute(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn increment_reel_views(&self, reel_id: Uuid) -> AppResult<Option<i64>> {
        let views = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE content_items SET views = views + 1
            WHERE id = $1 AND kind = 'reel'
            RETURNING views
            "#,
        )
        .bind(reel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(views)
    }

    async fn record_story_view(
        &self,
        story_id: Uuid,
        viewer_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO story_views (story_id, viewer_id, viewed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (story_id, viewer_id) DO NOTHING
            "#,
        )
        .bind(story_id)
        .bind(viewer_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EngagementStore for PgStore {
    async fn add_like(
        &self,
        target: EngagementTarget,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<i64>> {
        let result = sqlx::query(
            r#"
            INSERT INTO likes (target_kind, target_id, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (target_kind, target_id, user_id) DO NOTHING
            "#,
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(self.like_count(target).await?))
    }

    async fn remove_like(
        &self,
        target: EngagementTarget,
        user_id: Uuid,
    ) -> AppResult<Option<i64>> {
        let result = sqlx::query(
            r#"
            DELETE FROM likes
            WHERE target_kind = $1 AND target_id = $2 AND user_id = $3
            "#,
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(self.like_count(target).await?))
    }

    async fn like_count(&self, target: EngagementTarget) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM likes WHERE target_kind = $1 AND target_id = $2",
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn liked_by(
        &self,
        user_id: Uuid,
        targets: &[EngagementTarget],
    ) -> AppResult<HashSet<EngagementTarget>> {
        if targets.is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<Uuid> = targets.iter().map(|t| t.id).collect();
        let rows = sqlx::query_as::<_, (String, Uuid)>(
            r#"
            SELECT target_kind, target_id FROM likes
            WHERE user_id = $1 AND target_id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let requested: HashSet<EngagementTarget> = targets.iter().copied().collect();
        Ok(rows
            .into_iter()
            .filter_map(|(kind, id)| TargetKind::parse(&kind).map(|k| EngagementTarget::new(k, id)))
            .filter(|t| requested.contains(t))
            .collect())
    }

    async fn add_saved(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO saved_content (user_id, content_id, saved_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, content_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(content_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_saved(&self, user_id: Uuid, content_id: Uuid) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM saved_content WHERE user_id = $1 AND content_id = $2")
                .bind(user_id)
                .bind(content_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn saved_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT content_id FROM saved_content
            WHERE user_id = $1
            ORDER BY saved_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn insert_comment(&self, comment: &Comment) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, owner_id, content_id, text, parent_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(comment.id)
        .bind(comment.owner_id)
        .bind(comment.content_id)
        .bind(&comment.text)
        .bind(comment.parent_id)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn get_comment(&self, id: Uuid) -> AppResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn update_comment_text(
        &self,
        id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(&format!(
            "UPDATE comments SET text = $2, updated_at = $3 WHERE id = $1 RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(text)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM likes
            WHERE target_kind = 'comment'
              AND (target_id = $1 OR target_id IN (SELECT id FROM comments WHERE parent_id = $1))
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // replies cascade through parent_id
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn top_level_comments(&self, content_id: Uuid) -> AppResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            r#"
            SELECT {COMMENT_COLUMNS} FROM comments
            WHERE content_id = $1 AND parent_id IS NULL
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(content_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn replies(&self, parent_id: Uuid) -> AppResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            r#"
            SELECT {COMMENT_COLUMNS} FROM comments
            WHERE parent_id = $1
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn comment_count(&self, content_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE content_id = $1")
            .bind(content_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl MessagingStore for PgStore {
    async fn find_direct_conversation(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let mut pair = vec![a, b];
        pair.sort();
        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE NOT is_group AND participants = $1"
        ))
        .bind(&pair)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<Conversation> {
        let inserted = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            INSERT INTO conversations (id, participants, is_group, group_name, group_admin,
                                       last_message_id, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(conversation.id)
        .bind(&conversation.participants)
        .bind(conversation.is_group)
        .bind(conversation.group_name.as_deref())
        .bind(conversation.group_admin)
        .bind(conversation.last_message_id)
        .bind(conversation.is_active)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        if let Some(inserted) = inserted {
            return Ok(inserted);
        }

        // Lost a race on the direct-pair unique index
        match conversation.participants.as_slice() {
            [a, b] if !conversation.is_group => self
                .find_direct_conversation(*a, *b)
                .await?
                .ok_or_else(|| AppError::Internal("direct conversation vanished".to_string())),
            _ => Err(AppError::Internal(
                "conversation insert was skipped".to_string(),
            )),
        }
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE $1 = ANY(participants) AND is_active
            ORDER BY updated_at DESC, id ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(conversations)
    }

    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, text, media_url, media_type,
                                  is_deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.text.as_deref())
        .bind(message.media_url.as_deref())
        .bind(message.media_type.map(|m| m.as_str()))
        .bind(message.is_deleted)
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        for receipt in &message.read_by {
            sqlx::query(
                r#"
                INSERT INTO message_reads (message_id, user_id, read_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (message_id, user_id) DO NOTHING
                "#,
            )
            .bind(message.id)
            .bind(receipt.user_id)
            .bind(receipt.read_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE conversations SET last_message_id = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(message.conversation_id)
        .bind(message.id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate_messages(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1 AND NOT is_deleted
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_messages(rows).await
    }

    async fn mark_read(
        &self,
        message_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id, read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(reader_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_message(
        &self,
        id: Uuid,
        replacement_text: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            UPDATE messages
            SET is_deleted = TRUE, text = $2, media_url = NULL, media_type = NULL, updated_at = $3
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(replacement_text)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate_messages(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
        assert_eq!(like_pattern("alice"), "%alice%");
    }
}
