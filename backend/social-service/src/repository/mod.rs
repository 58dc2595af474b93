mod memory;
mod postgres;
mod r#trait;

use std::sync::Arc;

pub use memory::MemoryStore;
pub use postgres::PgStore;
#[cfg(test)]
pub use r#trait::MockRelationshipStore;
pub use r#trait::{
    AccountStore, CommentStore, ContentQuery, ContentStore, EngagementStore, MessagingStore,
    OwnerFilter, RelationshipStore,
};

/// Store handles shared by the services, one per concern
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub relationships: Arc<dyn RelationshipStore>,
    pub content: Arc<dyn ContentStore>,
    pub engagement: Arc<dyn EngagementStore>,
    pub comments: Arc<dyn CommentStore>,
    pub messaging: Arc<dyn MessagingStore>,
}

impl Stores {
    /// Wire every concern to one backend implementing all store traits
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: AccountStore
            + RelationshipStore
            + ContentStore
            + EngagementStore
            + CommentStore
            + MessagingStore
            + 'static,
    {
        Self {
            accounts: backend.clone(),
            relationships: backend.clone(),
            content: backend.clone(),
            engagement: backend.clone(),
            comments: backend.clone(),
            messaging: backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }
}
