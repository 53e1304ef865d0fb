use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::group::{Group, MembershipRecord};
use crate::store::GroupStore;

#[derive(Clone)]
pub struct PgGroupStore {
    pool: Pool<Postgres>,
}

impl PgGroupStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn from_row(row: PgRow) -> Group {
        let members: Json<HashSet<Uuid>> = row.get("members");
        let banned_users: Json<HashSet<Uuid>> = row.get("banned_users");
        let join_requests: Json<HashSet<Uuid>> = row.get("join_requests");
        let membership_history: Json<Vec<MembershipRecord>> = row.get("membership_history");
        let created_at: DateTime<Utc> = row.get("created_at");
        Group {
            id: row.get("id"),
            name: row.get("name"),
            owner_id: row.get("owner_id"),
            is_private: row.get("is_private"),
            max_members: row.get("max_members"),
            members: members.0,
            banned_users: banned_users.0,
            join_requests: join_requests.0,
            membership_history: membership_history.0,
            version: row.get("version"),
            created_at,
        }
    }
}

const GROUP_COLUMNS: &str = "id, name, owner_id, is_private, max_members, members, \
     banned_users, join_requests, membership_history, version, created_at";

#[async_trait]
impl GroupStore for PgGroupStore {
    async fn find(&self, id: Uuid) -> AppResult<Option<Group>> {
        let row = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Self::from_row))
    }

    async fn find_by_member(&self, user_id: Uuid) -> AppResult<Vec<Group>> {
        let rows = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups \
             WHERE members @> jsonb_build_array($1::text) \
             ORDER BY created_at DESC"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Self::from_row).collect())
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<Group>> {
        let rows = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Self::from_row).collect())
    }

    async fn insert(&self, group: &Group) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO groups \
             (id, name, owner_id, is_private, max_members, members, banned_users, \
              join_requests, membership_history, version, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.owner_id)
        .bind(group.is_private)
        .bind(group.max_members)
        .bind(Json(&group.members))
        .bind(Json(&group.banned_users))
        .bind(Json(&group.join_requests))
        .bind(Json(&group.membership_history))
        .bind(group.version)
        .bind(group.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, group: &Group) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE groups SET \
             name = $3, owner_id = $4, is_private = $5, max_members = $6, \
             members = $7, banned_users = $8, join_requests = $9, \
             membership_history = $10, version = version + 1 \
             WHERE id = $1 AND version = $2",
        )
        .bind(group.id)
        .bind(group.version)
        .bind(&group.name)
        .bind(group.owner_id)
        .bind(group.is_private)
        .bind(group.max_members)
        .bind(Json(&group.members))
        .bind(Json(&group.banned_users))
        .bind(Json(&group.join_requests))
        .bind(Json(&group.membership_history))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, group: &Group) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1 AND version = $2")
            .bind(group.id)
            .bind(group.version)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
