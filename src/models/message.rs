use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted message. `content` is ciphertext; plaintext only ever exists in
/// memory and in the real-time delivery payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Message as returned to clients, content decrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageView {
    pub fn from_stored(stored: StoredMessage, plaintext: String) -> Self {
        Self {
            id: stored.id,
            group_id: stored.group_id,
            sender: stored.sender_id,
            content: plaintext,
            timestamp: stored.created_at,
        }
    }
}
