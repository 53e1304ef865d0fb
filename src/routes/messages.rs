use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::MessageView;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    /// Exclusive cursor: only messages created strictly before this instant.
    pub before: Option<DateTime<Utc>>,
}

/// POST /messages/:group_id
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(group_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    if body.content.is_empty() {
        return Err(AppError::BadRequest("Message content is required".into()));
    }
    let message = state
        .pipeline
        .send_message(user_id, group_id, body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/:group_id?limit=&before=
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    let messages = state
        .pipeline
        .get_messages(user_id, group_id, query.limit, query.before)
        .await?;
    Ok(Json(messages))
}
