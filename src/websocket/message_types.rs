use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::events::{DeliveryMessage, GroupNotification};

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    #[serde(rename = "joinGroup")]
    JoinGroup {
        #[serde(rename = "groupId")]
        group_id: Uuid,
    },
    #[serde(rename = "leaveGroup")]
    LeaveGroup {
        #[serde(rename = "groupId")]
        group_id: Uuid,
    },
    #[serde(rename = "sendMessage")]
    SendMessage {
        #[serde(rename = "groupId")]
        group_id: Uuid,
        content: String,
    },
    #[serde(rename = "listGroups")]
    ListGroups,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum WsOutboundEvent {
    #[serde(rename = "joined")]
    Joined {
        #[serde(rename = "groupId")]
        group_id: Uuid,
    },
    #[serde(rename = "newMessage")]
    NewMessage { message: DeliveryMessage },
    #[serde(rename = "groupEvent")]
    GroupEvent { event: GroupNotification },
    #[serde(rename = "groupsList")]
    GroupsList { groups: Vec<GroupSummary> },
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Serialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "memberCount")]
    pub member_count: usize,
}

impl WsOutboundEvent {
    pub fn to_json(&self) -> String {
        // Every variant is plain data; serialization cannot fail.
        serde_json::to_string(self).expect("outbound event serializes")
    }
}
