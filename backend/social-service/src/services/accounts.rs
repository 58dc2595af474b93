use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{
    Account, AccountSummary, ContentKind, NewAccount, ProfileUpdate, ProfileView,
};
use crate::error::{AppError, AppResult};
use crate::repository::{ContentQuery, Stores};

/// Usernames are ASCII letters, digits, dots and underscores
fn valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

#[derive(Clone)]
pub struct AccountService {
    stores: Stores,
    search_limit: usize,
}

impl AccountService {
    pub fn new(stores: Stores, search_limit: usize) -> Self {
        Self {
            stores,
            search_limit,
        }
    }

    pub async fn require(&self, id: Uuid) -> AppResult<Account> {
        self.stores
            .accounts
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    pub async fn register(&self, input: NewAccount) -> AppResult<Account> {
        input.validate()?;
        if !valid_username(input.username.trim()) {
            return Err(AppError::validation(
                "username may only contain letters, numbers, dots and underscores",
            ));
        }

        let account = Account::new(input, Utc::now());
        self.stores.accounts.insert_account(&account).await?;
        info!(user = %account.id, username = %account.username, "Account registered");
        Ok(account)
    }

    /// Public profile card. Private accounts still show their header and counts.
    pub async fn profile(&self, viewer: Option<Uuid>, username: &str) -> AppResult<ProfileView> {
        let account = self
            .stores
            .accounts
            .get_by_username(username)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        let is_own_profile = viewer == Some(account.id);
        if is_own_profile {
            self.stores
                .accounts
                .touch_last_active(account.id, Utc::now())
                .await?;
        }
        let is_following = match viewer {
            Some(viewer_id) if !is_own_profile => {
                self.stores
                    .relationships
                    .is_following(viewer_id, account.id)
                    .await?
            }
            _ => false,
        };
        let counts = self.stores.relationships.follow_counts(account.id).await?;
        let posts_count = self
            .stores
            .content
            .count_content(&ContentQuery::of(ContentKind::Post).owned_by([account.id]))
            .await?;

        Ok(ProfileView {
            account: AccountSummary::from(&account),
            bio: account.bio,
            website: account.website,
            is_private: account.is_private,
            followers_count: counts.followers,
            following_count: counts.following,
            posts_count,
            is_following,
            is_own_profile,
        })
    }

    pub async fn update_profile(&self, viewer: Uuid, update: ProfileUpdate) -> AppResult<Account> {
        update.validate()?;
        self.stores
            .accounts
            .update_profile(viewer, &update, Utc::now())
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    pub async fn set_privacy(&self, viewer: Uuid, is_private: bool) -> AppResult<()> {
        if !self
            .stores
            .accounts
            .set_privacy(viewer, is_private, Utc::now())
            .await?
        {
            return Err(AppError::not_found("User"));
        }
        info!(user = %viewer, is_private, "Privacy updated");
        Ok(())
    }

    pub async fn touch_last_active(&self, viewer: Uuid) -> AppResult<()> {
        self.stores
            .accounts
            .touch_last_active(viewer, Utc::now())
            .await
    }

    /// Case-insensitive substring search on username and full name
    pub async fn search(&self, query: &str) -> AppResult<Vec<AccountSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let accounts = self
            .stores
            .accounts
            .search_accounts(query, self.search_limit)
            .await?;
        Ok(accounts.iter().map(AccountSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentItem, NewPost, NewReel};
    use crate::error::ErrorKind;

    fn new_account(username: &str) -> NewAccount {
        NewAccount {
            username: username.into(),
            email: format!("{}@example.com", username.replace('.', "")),
            full_name: "Test User".into(),
            is_private: false,
        }
    }

    #[tokio::test]
    async fn register_validates_input() {
        let service = AccountService::new(Stores::in_memory(), 10);

        let err = service.register(new_account("ab")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = service.register(new_account("bad-name")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let mut bad_email = new_account("gooduser");
        bad_email.email = "not-an-email".into();
        assert!(service.register(bad_email).await.is_err());

        service.register(new_account("good.user")).await.unwrap();
        let err = service.register(new_account("good.user")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn profile_reports_counts_and_relationship() {
        let stores = Stores::in_memory();
        let service = AccountService::new(stores.clone(), 10);
        let alice = service.register(new_account("alice")).await.unwrap();
        let bob = service.register(new_account("bob")).await.unwrap();
        stores
            .relationships
            .insert_follow(bob.id, alice.id, Utc::now())
            .await
            .unwrap();

        let view = service.profile(Some(bob.id), "ALICE").await.unwrap();
        assert!(view.is_following);
        assert!(!view.is_own_profile);
        assert_eq!(view.followers_count, 1);

        let own = service.profile(Some(alice.id), "alice").await.unwrap();
        assert!(own.is_own_profile);
        assert!(!own.is_following);
    }

    #[tokio::test]
    async fn posts_count_skips_archived_posts_and_other_kinds() {
        let stores = Stores::in_memory();
        let service = AccountService::new(stores.clone(), 10);
        let alice = service.register(new_account("alice")).await.unwrap();
        let now = Utc::now();
        let post = |caption: &str| NewPost {
            caption: caption.into(),
            images: vec!["https://cdn.example.com/a.jpg".into()],
            location: None,
        };

        for caption in ["one", "two"] {
            let item = ContentItem::new_post(alice.id, post(caption), now);
            stores.content.insert_content(&item).await.unwrap();
        }
        let mut archived = ContentItem::new_post(alice.id, post("old"), now);
        archived.is_archived = true;
        stores.content.insert_content(&archived).await.unwrap();
        let reel = ContentItem::new_reel(
            alice.id,
            NewReel {
                caption: String::new(),
                video_url: "https://cdn.example.com/r.mp4".into(),
                thumbnail_url: "https://cdn.example.com/r.jpg".into(),
                audio_name: None,
            },
            now,
        );
        stores.content.insert_content(&reel).await.unwrap();

        let view = service.profile(None, "alice").await.unwrap();
        assert_eq!(view.posts_count, 2);
    }

    #[tokio::test]
    async fn search_is_bounded_and_ignores_blank_queries() {
        let service = AccountService::new(Stores::in_memory(), 2);
        for name in ["anna", "annie", "hannah", "bob"] {
            service.register(new_account(name)).await.unwrap();
        }

        assert!(service.search("   ").await.unwrap().is_empty());
        let found = service.search("ANN").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|a| a.username.contains("ann")));
    }

    #[tokio::test]
    async fn privacy_and_profile_updates() {
        let service = AccountService::new(Stores::in_memory(), 10);
        let alice = service.register(new_account("alice")).await.unwrap();

        service.set_privacy(alice.id, true).await.unwrap();
        let updated = service
            .update_profile(
                alice.id,
                ProfileUpdate {
                    bio: Some("hello".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_private);
        assert_eq!(updated.bio, "hello");

        let updated = service
            .update_profile(
                alice.id,
                ProfileUpdate {
                    profile_image: Some("https://cdn.example.com/alice.png".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.profile_image, "https://cdn.example.com/alice.png");
        assert_eq!(updated.bio, "hello");

        let too_long = ProfileUpdate {
            bio: Some("x".repeat(151)),
            ..Default::default()
        };
        assert!(service.update_profile(alice.id, too_long).await.is_err());
        assert!(service.set_privacy(Uuid::new_v4(), true).await.is_err());
    }
}
