use std::sync::Arc;

use crate::config::Config;
use crate::services::{GroupService, MessagePipeline};
use crate::websocket::subscription::SubscriptionMap;
use crate::websocket::RoomRegistry;

/// Shared application state cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub groups: GroupService,
    pub pipeline: Arc<MessagePipeline>,
    pub registry: RoomRegistry,
    pub subscriptions: SubscriptionMap,
}
