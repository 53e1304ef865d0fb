use axum::extract::State;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Claims {
    /// User id the token was issued for.
    pub id: Uuid,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Validate an HS256 token and extract the user id. Tokens without an `exp`
/// claim are accepted; expired ones are not.
pub fn verify_token(token: &str, secret: &str) -> Result<Uuid, AppError> {
    let mut validation = Validation::default();
    validation.required_spec_claims.clear();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims.id)
    .map_err(|_| AppError::Unauthorized)
}

/// Middleware that requires a Bearer token and inserts the authenticated
/// user id into request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let user_id = verify_token(token, &state.config.jwt_secret)?;
    req.extensions_mut().insert(user_id);

    Ok(next.run(req).await)
}
