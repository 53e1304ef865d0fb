use async_trait::async_trait;

use crate::error::AppResult;

pub mod events;
pub mod gateway;

pub use events::{DeliveryEvent, DeliveryMessage, GroupNotification};
pub use gateway::BrokerGateway;

/// Publish side of the broker, as a seam so the pipeline can be exercised
/// against a fake in tests.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Fan-out: reaches every server process unconditionally.
    async fn publish_delivery(&self, event: &DeliveryEvent) -> AppResult<()>;

    /// Topic: reaches only processes bound to `group.<groupId>.*`.
    async fn publish_notification(&self, event: &GroupNotification) -> AppResult<()>;
}
