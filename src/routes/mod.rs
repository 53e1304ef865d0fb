use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::middleware::auth::auth_middleware;
use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

pub mod groups;
pub mod messages;

use groups::{
    approve_join, ban_member, create_group, join_group, leave_group, list_groups,
    transfer_ownership,
};
use messages::{get_messages, send_message};

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/groups", post(create_group).get(list_groups))
        .route("/groups/:group_id/join", post(join_group))
        .route("/groups/:group_id/approve/:user_id", post(approve_join))
        .route("/groups/:group_id/leave", post(leave_group))
        .route("/groups/:group_id/ban/:user_id", post(ban_member))
        .route(
            "/groups/:group_id/transfer/:new_owner_id",
            post(transfer_ownership),
        )
        .route("/messages/:group_id", post(send_message).get(get_messages))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        // The ws handler authenticates itself before the upgrade.
        .route("/ws", get(ws_handler))
        .nest("/api/v1", api)
        .with_state(state)
}
