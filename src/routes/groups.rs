use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::group::{Group, JoinOutcome, LeaveOutcome};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<Uuid>,
    #[serde(default, rename = "isPrivate")]
    pub is_private: bool,
    #[serde(rename = "maxMembers")]
    pub max_members: Option<i32>,
}

#[derive(Deserialize)]
pub struct ListGroupsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct GroupResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "ownerId")]
    pub owner_id: Uuid,
    #[serde(rename = "isPrivate")]
    pub is_private: bool,
    #[serde(rename = "maxMembers")]
    pub max_members: Option<i32>,
    pub members: Vec<Uuid>,
    #[serde(rename = "joinRequests")]
    pub join_requests: Vec<Uuid>,
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            owner_id: group.owner_id,
            is_private: group.is_private,
            max_members: group.max_members,
            members: group.members.into_iter().collect(),
            join_requests: group.join_requests.into_iter().collect(),
        }
    }
}

/// POST /groups
pub async fn create_group(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), AppError> {
    let group = state
        .groups
        .create_group(
            user_id,
            body.name,
            &body.members,
            body.is_private,
            body.max_members,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(group.into())))
}

/// GET /groups?page=&limit=
pub async fn list_groups(
    State(state): State<AppState>,
    Extension(_user_id): Extension<Uuid>,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<Vec<GroupResponse>>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let groups = state.groups.list_groups(limit, (page - 1) * limit).await?;
    Ok(Json(groups.into_iter().map(Into::into).collect()))
}

#[derive(Serialize)]
pub struct JoinResponse {
    pub status: &'static str,
}

/// POST /groups/:group_id/join
pub async fn join_group(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<JoinResponse>, AppError> {
    let (_, outcome) = state.groups.join(user_id, group_id).await?;
    let status = match outcome {
        JoinOutcome::Joined => "joined",
        JoinOutcome::Requested => "requested",
    };
    Ok(Json(JoinResponse { status }))
}

/// POST /groups/:group_id/approve/:user_id
pub async fn approve_join(
    State(state): State<AppState>,
    Extension(caller): Extension<Uuid>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GroupResponse>, AppError> {
    let group = state.groups.approve_join(caller, group_id, user_id).await?;
    Ok(Json(group.into()))
}

#[derive(Serialize)]
pub struct LeaveResponse {
    pub message: &'static str,
}

/// POST /groups/:group_id/leave
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<LeaveResponse>, AppError> {
    let message = match state.groups.leave(user_id, group_id).await? {
        LeaveOutcome::Left => "Left group",
        LeaveOutcome::DeleteGroup => "Group deleted",
    };
    Ok(Json(LeaveResponse { message }))
}

/// POST /groups/:group_id/ban/:user_id
pub async fn ban_member(
    State(state): State<AppState>,
    Extension(caller): Extension<Uuid>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GroupResponse>, AppError> {
    let group = state.groups.ban(caller, group_id, user_id).await?;
    Ok(Json(group.into()))
}

/// POST /groups/:group_id/transfer/:new_owner_id
pub async fn transfer_ownership(
    State(state): State<AppState>,
    Extension(caller): Extension<Uuid>,
    Path((group_id, new_owner_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GroupResponse>, AppError> {
    let group = state
        .groups
        .transfer_ownership(caller, group_id, new_owner_id)
        .await?;
    Ok(Json(group.into()))
}
