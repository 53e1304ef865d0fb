//! In-memory store implementations. The stores and broker gateway are
//! injected components so tests can run the pipeline and hub against these
//! without Postgres or Redis.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::group::Group;
use crate::models::message::StoredMessage;
use crate::store::{GroupStore, MessageStore};

#[derive(Default, Clone)]
pub struct MemoryGroupStore {
    inner: Arc<RwLock<HashMap<Uuid, Group>>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn find(&self, id: Uuid) -> AppResult<Option<Group>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn find_by_member(&self, user_id: Uuid) -> AppResult<Vec<Group>> {
        let guard = self.inner.read().await;
        let mut groups: Vec<Group> = guard
            .values()
            .filter(|g| g.members.contains(&user_id))
            .cloned()
            .collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(groups)
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<Group>> {
        let guard = self.inner.read().await;
        let mut groups: Vec<Group> = guard.values().cloned().collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(groups
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn insert(&self, group: &Group) -> AppResult<()> {
        self.inner.write().await.insert(group.id, group.clone());
        Ok(())
    }

    async fn update(&self, group: &Group) -> AppResult<bool> {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&group.id) {
            Some(existing) if existing.version == group.version => {
                let mut updated = group.clone();
                updated.version += 1;
                *existing = updated;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, group: &Group) -> AppResult<bool> {
        let mut guard = self.inner.write().await;
        match guard.get(&group.id) {
            Some(existing) if existing.version == group.version => {
                guard.remove(&group.id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default, Clone)]
pub struct MemoryMessageStore {
    inner: Arc<RwLock<Vec<StoredMessage>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: &StoredMessage) -> AppResult<()> {
        self.inner.write().await.push(message.clone());
        Ok(())
    }

    async fn list_by_group(
        &self,
        group_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<StoredMessage>> {
        let guard = self.inner.read().await;
        let mut out: Vec<StoredMessage> = guard
            .iter()
            .filter(|m| m.group_id == group_id)
            .filter(|m| before.map_or(true, |b| m.created_at < b))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit as usize);
        Ok(out)
    }
}
