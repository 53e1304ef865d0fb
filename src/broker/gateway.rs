use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::broker::events::{DeliveryEvent, GroupNotification, FANOUT_CHANNEL};
use crate::broker::EventPublisher;
use crate::error::{AppError, AppResult};

/// Fixed reconnect delay. No backoff growth and no retry cap: the broker is
/// assumed eventually recoverable and the alternative is total outage.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Owns the publish connection to the broker and supervises its lifecycle.
///
/// Explicitly constructed and injected (no process-global singleton) so
/// tests can substitute fakes and run isolated instances in one process.
/// While disconnected, publishes fail fast with `BrokerUnavailable` instead
/// of queueing; a background task re-establishes the connection on a fixed
/// 5s cadence.
pub struct BrokerGateway {
    client: redis::Client,
    publisher: Arc<RwLock<Option<MultiplexedConnection>>>,
    reconnecting: Arc<AtomicBool>,
}

impl BrokerGateway {
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Config(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "broker connect failed");
                AppError::BrokerUnavailable
            })?;
        tracing::info!("connected to message broker");
        Ok(Self {
            client,
            publisher: Arc::new(RwLock::new(Some(conn))),
            reconnecting: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A dedicated client handle for the consumer's pub/sub connection.
    pub fn client(&self) -> redis::Client {
        self.client.clone()
    }

    async fn publish_raw(&self, channel: &str, payload: String) -> AppResult<()> {
        // The multiplexed connection is cheap to clone; cloning it out keeps
        // the lock out of the publish await so publishes run concurrently.
        let mut conn = self
            .publisher
            .read()
            .await
            .clone()
            .ok_or(AppError::BrokerUnavailable)?;
        match conn.publish::<_, _, ()>(channel, payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, channel, "broker publish failed; entering reconnect");
                *self.publisher.write().await = None;
                self.spawn_reconnect();
                Err(AppError::BrokerUnavailable)
            }
        }
    }

    /// Reconnect loop: immediate first attempt, then every 5s until success.
    fn spawn_reconnect(&self) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let client = self.client.clone();
        let slot = Arc::clone(&self.publisher);
        let flag = Arc::clone(&self.reconnecting);
        tokio::spawn(async move {
            loop {
                match client.get_multiplexed_async_connection().await {
                    Ok(conn) => {
                        *slot.write().await = Some(conn);
                        flag.store(false, Ordering::SeqCst);
                        tracing::info!("broker publish connection restored");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "broker reconnect failed; retrying in 5s");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });
    }

    /// Tear down the publish connection. Idempotent.
    pub async fn close(&self) {
        *self.publisher.write().await = None;
    }
}

#[async_trait]
impl EventPublisher for BrokerGateway {
    async fn publish_delivery(&self, event: &DeliveryEvent) -> AppResult<()> {
        let payload = serde_json::to_string(event).map_err(|_| AppError::Internal)?;
        self.publish_raw(FANOUT_CHANNEL, payload).await
    }

    async fn publish_notification(&self, event: &GroupNotification) -> AppResult<()> {
        let payload = serde_json::to_string(event).map_err(|_| AppError::Internal)?;
        self.publish_raw(&event.channel(), payload).await
    }
}
