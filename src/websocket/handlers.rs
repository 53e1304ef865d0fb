use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::verify_token;
use crate::state::AppState;
use crate::websocket::message_types::{GroupSummary, WsInboundEvent, WsOutboundEvent};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Upgrade handler. The token is verified before the upgrade completes, via
/// `?token=` or an `Authorization: Bearer` header.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .token
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::to_owned)
        })
        .ok_or(AppError::Unauthorized)?;
    let user_id = verify_token(&token, &state.config.jwt_secret)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let conn_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    tracing::debug!(%user_id, %conn_id, "websocket connected");

    // Groups this connection has joined, for unbind on disconnect. Shared
    // with the in-flight event tasks.
    let joined: Arc<Mutex<HashSet<Uuid>>> = Arc::new(Mutex::new(HashSet::new()));

    // Each inbound event runs as its own task keyed to this connection, so
    // a disconnect aborts in-flight group lookups instead of waiting on
    // them.
    let mut tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        tasks.spawn(handle_event(
                            state.clone(),
                            user_id,
                            conn_id,
                            tx.clone(),
                            joined.clone(),
                            text,
                        ));
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = tx.send(Message::Pong(payload));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%conn_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            // Reap finished event tasks; disabled while none are running.
            Some(_) = tasks.join_next() => {}
        }
    }

    tasks.abort_all();
    state.registry.leave_all(conn_id).await;
    for group_id in joined.lock().await.drain() {
        state.subscriptions.unbind(group_id).await;
    }
    tracing::debug!(%user_id, %conn_id, "websocket disconnected");
}

async fn handle_event(
    state: AppState,
    user_id: Uuid,
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
    joined: Arc<Mutex<HashSet<Uuid>>>,
    text: String,
) {
    let event: WsInboundEvent = match serde_json::from_str(&text) {
        Ok(event) => event,
        Err(_) => {
            send(&tx, &WsOutboundEvent::Error {
                message: "Invalid message format".into(),
            });
            return;
        }
    };

    match event {
        WsInboundEvent::JoinGroup { group_id } => {
            if state.groups.ensure_member(group_id, user_id).await.is_err() {
                send(&tx, &WsOutboundEvent::Error {
                    message: "Not authorized to join this group".into(),
                });
                return;
            }
            state.registry.join(group_id, conn_id, tx.clone()).await;
            if joined.lock().await.insert(group_id) {
                state.subscriptions.bind(group_id).await;
            }
            send(&tx, &WsOutboundEvent::Joined { group_id });
        }
        WsInboundEvent::LeaveGroup { group_id } => {
            state.registry.leave(group_id, conn_id).await;
            if joined.lock().await.remove(&group_id) {
                state.subscriptions.unbind(group_id).await;
            }
        }
        WsInboundEvent::SendMessage { group_id, content } => {
            if let Err(e) = state
                .pipeline
                .publish_realtime(user_id, group_id, content)
                .await
            {
                send(&tx, &WsOutboundEvent::Error {
                    message: e.client_message(),
                });
            }
        }
        WsInboundEvent::ListGroups => match state.groups.groups_for_member(user_id).await {
            Ok(groups) => {
                let groups = groups
                    .into_iter()
                    .map(|g| GroupSummary {
                        id: g.id,
                        name: g.name,
                        member_count: g.members.len(),
                    })
                    .collect();
                send(&tx, &WsOutboundEvent::GroupsList { groups });
            }
            Err(e) => {
                send(&tx, &WsOutboundEvent::Error {
                    message: e.client_message(),
                });
            }
        },
    }
}

fn send(tx: &mpsc::UnboundedSender<Message>, event: &WsOutboundEvent) {
    // A failed send means the connection is tearing down.
    let _ = tx.send(Message::Text(event.to_json()));
}
