pub mod accounts;
pub mod comments;
pub mod content;
pub mod feed;
pub mod interactions;
pub mod messaging;
pub mod relationships;
pub mod visibility;

pub use accounts::AccountService;
pub use comments::CommentService;
pub use content::ContentService;
pub use feed::FeedAssembler;
pub use interactions::{InteractionLedger, ViewOutcome};
pub use messaging::MessagingService;
pub use relationships::RelationshipService;
pub use visibility::VisibilityEngine;

use crate::config::FeedConfig;
use crate::repository::Stores;

/// Every service, wired to one set of stores. Shared as actix app data.
#[derive(Clone)]
pub struct SocialCore {
    pub stores: Stores,
    pub accounts: AccountService,
    pub relationships: RelationshipService,
    pub visibility: VisibilityEngine,
    pub ledger: InteractionLedger,
    pub feed: FeedAssembler,
    pub content: ContentService,
    pub comments: CommentService,
    pub messaging: MessagingService,
}

impl SocialCore {
    pub fn new(stores: Stores, config: FeedConfig) -> Self {
        let visibility = VisibilityEngine::new(stores.relationships.clone());
        let ledger = InteractionLedger::new(stores.clone(), visibility.clone());
        let feed = FeedAssembler::new(stores.clone(), visibility.clone(), config.clone());

        Self {
            accounts: AccountService::new(stores.clone(), config.search_limit),
            relationships: RelationshipService::new(&stores),
            content: ContentService::new(
                stores.clone(),
                visibility.clone(),
                ledger.clone(),
                feed.clone(),
                config.story_ttl(),
            ),
            comments: CommentService::new(stores.clone(), visibility.clone()),
            messaging: MessagingService::new(stores.clone(), ledger.clone(), config.online_window()),
            visibility,
            ledger,
            feed,
            stores,
        }
    }
}
