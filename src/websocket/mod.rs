use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

pub mod handlers;
pub mod message_types;
pub mod pubsub;
pub mod subscription;

/// Rooms: the set of live connections on this process associated with a
/// group id. Broker-delivered events are filtered through this before any
/// socket sees them.
#[derive(Default, Clone)]
pub struct RoomRegistry {
    // group_id -> connection_id -> outbound sender
    inner: Arc<RwLock<HashMap<Uuid, HashMap<Uuid, UnboundedSender<Message>>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, group_id: Uuid, conn_id: Uuid, tx: UnboundedSender<Message>) {
        let mut guard = self.inner.write().await;
        guard.entry(group_id).or_default().insert(conn_id, tx);
    }

    pub async fn leave(&self, group_id: Uuid, conn_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(room) = guard.get_mut(&group_id) {
            room.remove(&conn_id);
            if room.is_empty() {
                guard.remove(&group_id);
            }
        }
    }

    pub async fn leave_all(&self, conn_id: Uuid) {
        let mut guard = self.inner.write().await;
        guard.retain(|_, room| {
            room.remove(&conn_id);
            !room.is_empty()
        });
    }

    /// Push to every live connection in the room, dropping closed senders.
    pub async fn broadcast(&self, group_id: Uuid, msg: Message) {
        let mut guard = self.inner.write().await;
        if let Some(room) = guard.get_mut(&group_id) {
            room.retain(|_, tx| tx.send(msg.clone()).is_ok());
        }
    }

    pub async fn room_size(&self, group_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .get(&group_id)
            .map(|r| r.len())
            .unwrap_or(0)
    }
}
