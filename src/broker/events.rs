use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fan-out channel carrying full delivery events to every server process.
pub const FANOUT_CHANNEL: &str = "chat_messages";

/// Prefix of the group-scoped topic channels: `group.<groupId>.<eventType>`.
pub const TOPIC_PREFIX: &str = "group";

pub fn topic_channel(group_id: Uuid, event_type: &str) -> String {
    format!("{TOPIC_PREFIX}.{group_id}.{event_type}")
}

/// Binding pattern subscribed per group: `group.<groupId>.*`.
pub fn group_binding_pattern(group_id: Uuid) -> String {
    format!("{TOPIC_PREFIX}.{group_id}.*")
}

/// Payload pushed to fan-out subscribers. Carries the plaintext: the event
/// only crosses the broker/local-process boundary and is room-filtered
/// before reaching sockets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    #[serde(rename = "groupId")]
    pub group_id: Uuid,
    pub message: DeliveryMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryMessage {
    /// Absent for realtime-only publishes that were never persisted.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
    pub id: Option<Uuid>,
    pub content: String,
    pub sender: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Lightweight group-scoped notification on the topic channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupNotification {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "groupId")]
    pub group_id: Uuid,
    #[serde(rename = "messageId")]
    pub message_id: Uuid,
}

impl GroupNotification {
    pub fn new_message(group_id: Uuid, message_id: Uuid) -> Self {
        Self {
            event_type: "message".into(),
            group_id,
            message_id,
        }
    }

    pub fn channel(&self) -> String {
        topic_channel(self.group_id, &self.event_type)
    }
}
