use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("{0}")]
    BadRequest(String),

    // Missing or invalid bearer token.
    #[error("Authentication failed")]
    Unauthorized,

    #[error("Group not found")]
    GroupNotFound,

    #[error("Not authorized - Not a member of this group")]
    NotAMember,

    #[error("Not authorized")]
    NotAuthorized,

    #[error("You are banned from this group")]
    Banned,

    #[error("Group has reached maximum member limit")]
    CapacityExceeded,

    #[error("You must wait 48 hours after leaving before rejoining")]
    CooldownActive,

    #[error("Join request already sent")]
    AlreadyRequested,

    #[error("No join request found")]
    NoSuchRequest,

    #[error("Transfer ownership before leaving")]
    OwnerMustTransfer,

    #[error("Cannot ban the owner")]
    CannotBanOwner,

    #[error("New owner must be a member")]
    NewOwnerNotMember,

    #[error("{0}")]
    InvalidMembership(String),

    #[error("message broker unavailable")]
    BrokerUnavailable,

    #[error("encryption error: {0}")]
    Cipher(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_)
            | AppError::CapacityExceeded
            | AppError::AlreadyRequested
            | AppError::NoSuchRequest
            | AppError::OwnerMustTransfer
            | AppError::CannotBanOwner
            | AppError::NewOwnerNotMember
            | AppError::InvalidMembership(_) => StatusCode::BAD_REQUEST,
            // The external contract maps membership rejection to 401.
            AppError::Unauthorized | AppError::NotAMember => StatusCode::UNAUTHORIZED,
            AppError::NotAuthorized | AppError::Banned | AppError::CooldownActive => {
                StatusCode::FORBIDDEN
            }
            AppError::GroupNotFound => StatusCode::NOT_FOUND,
            AppError::BrokerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Cipher(_)
            | AppError::Database(_)
            | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Business errors carry their precise message to the client; clients
    /// key UI behavior off these strings. Infrastructure and internal errors
    /// are logged with detail and reduced to a generic body.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Cipher(_)
            | AppError::Database(_)
            | AppError::Internal => "Internal server error".to_string(),
            AppError::BrokerUnavailable => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "message": self.client_message() });
        (status, Json(body)).into_response()
    }
}
