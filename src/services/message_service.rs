use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::broker::events::{DeliveryEvent, DeliveryMessage, GroupNotification};
use crate::broker::EventPublisher;
use crate::error::{AppError, AppResult};
use crate::models::message::{MessageView, StoredMessage};
use crate::services::cipher::MessageCipher;
use crate::store::{GroupStore, MessageStore};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;

/// The message distribution pipeline: authorize sender → encrypt → persist →
/// publish. Delivery back to sockets happens in the websocket consumer.
pub struct MessagePipeline {
    groups: Arc<dyn GroupStore>,
    messages: Arc<dyn MessageStore>,
    cipher: MessageCipher,
    publisher: Arc<dyn EventPublisher>,
}

impl MessagePipeline {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        messages: Arc<dyn MessageStore>,
        cipher: MessageCipher,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            groups,
            messages,
            cipher,
            publisher,
        }
    }

    async fn ensure_member(&self, group_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let group = self
            .groups
            .find(group_id)
            .await?
            .ok_or(AppError::GroupNotFound)?;
        if !group.is_member(user_id) {
            return Err(AppError::NotAMember);
        }
        Ok(())
    }

    /// Full pipeline. The stored content is ciphertext; the delivery event
    /// and the response to the sender carry the plaintext.
    pub async fn send_message(
        &self,
        sender: Uuid,
        group_id: Uuid,
        content: String,
    ) -> AppResult<MessageView> {
        self.ensure_member(group_id, sender).await?;

        let ciphertext = self.cipher.encrypt(group_id, &content)?;
        let stored = StoredMessage {
            id: Uuid::new_v4(),
            group_id,
            sender_id: sender,
            content: ciphertext,
            created_at: Utc::now(),
        };
        self.messages.insert(&stored).await?;

        self.publisher
            .publish_delivery(&DeliveryEvent {
                group_id,
                message: DeliveryMessage {
                    id: Some(stored.id),
                    content: content.clone(),
                    sender,
                    timestamp: stored.created_at,
                },
            })
            .await?;
        self.publisher
            .publish_notification(&GroupNotification::new_message(group_id, stored.id))
            .await?;

        Ok(MessageView::from_stored(stored, content))
    }

    /// Realtime-only publish path (no persistence), used by the hub's
    /// `sendMessage` event. Performs the same membership check as the
    /// persisted path before anything reaches the broker.
    pub async fn publish_realtime(
        &self,
        sender: Uuid,
        group_id: Uuid,
        content: String,
    ) -> AppResult<()> {
        self.ensure_member(group_id, sender).await?;
        self.publisher
            .publish_delivery(&DeliveryEvent {
                group_id,
                message: DeliveryMessage {
                    id: None,
                    content,
                    sender,
                    timestamp: Utc::now(),
                },
            })
            .await
    }

    /// History, newest first, decrypted on read.
    pub async fn get_messages(
        &self,
        requester: Uuid,
        group_id: Uuid,
        limit: Option<i64>,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<MessageView>> {
        self.ensure_member(group_id, requester).await?;

        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let stored = self.messages.list_by_group(group_id, limit, before).await?;

        stored
            .into_iter()
            .map(|m| {
                let plaintext = self.cipher.decrypt(group_id, &m.content)?;
                Ok(MessageView::from_stored(m, plaintext))
            })
            .collect()
    }
}
