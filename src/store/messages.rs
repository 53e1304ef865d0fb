use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::message::StoredMessage;
use crate::store::MessageStore;

#[derive(Clone)]
pub struct PgMessageStore {
    pool: Pool<Postgres>,
}

impl PgMessageStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(&self, message: &StoredMessage) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, group_id, sender_id, content, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(message.id)
        .bind(message.group_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_group(
        &self,
        group_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<StoredMessage>> {
        let rows = match before {
            Some(cursor) => {
                sqlx::query(
                    "SELECT id, group_id, sender_id, content, created_at FROM messages \
                     WHERE group_id = $1 AND created_at < $2 \
                     ORDER BY created_at DESC LIMIT $3",
                )
                .bind(group_id)
                .bind(cursor)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, group_id, sender_id, content, created_at FROM messages \
                     WHERE group_id = $1 ORDER BY created_at DESC LIMIT $2",
                )
                .bind(group_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|r| StoredMessage {
                id: r.get("id"),
                group_id: r.get("group_id"),
                sender_id: r.get("sender_id"),
                content: r.get("content"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
