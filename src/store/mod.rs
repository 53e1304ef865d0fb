use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::group::Group;
use crate::models::message::StoredMessage;

pub mod groups;
pub mod memory;
pub mod messages;

pub use groups::PgGroupStore;
pub use messages::PgMessageStore;

/// Abstract document store for Group aggregates.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn find(&self, id: Uuid) -> AppResult<Option<Group>>;

    /// Groups the given user is a member of.
    async fn find_by_member(&self, user_id: Uuid) -> AppResult<Vec<Group>>;

    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<Group>>;

    async fn insert(&self, group: &Group) -> AppResult<()>;

    /// Compare-and-swap on `group.version`: persists all mutable fields with
    /// version + 1 and returns false when another writer got there first.
    async fn update(&self, group: &Group) -> AppResult<bool>;

    /// Compare-and-swap deletion: removes the group only if `group.version`
    /// still matches, returning false when a concurrent writer advanced it.
    async fn delete(&self, group: &Group) -> AppResult<bool>;
}

/// Append-only message persistence, queryable by group and time cursor.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: &StoredMessage) -> AppResult<()>;

    /// Newest-first, truncated to `limit`, optionally only messages strictly
    /// older than `before`.
    async fn list_by_group(
        &self,
        group_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<StoredMessage>>;
}
