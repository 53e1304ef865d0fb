use async_trait::async_trait;
use axum::extract::ws::Message;
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::broker::events::{group_binding_pattern, DeliveryEvent, GroupNotification, FANOUT_CHANNEL};
use crate::broker::gateway::RECONNECT_DELAY;
use crate::websocket::message_types::WsOutboundEvent;
use crate::websocket::subscription::{BindCommand, SubscriptionMap};
use crate::websocket::RoomRegistry;

/// Per-process consumer: one pub/sub connection subscribed to the fan-out
/// channel plus the refcounted group patterns, bridging broker events into
/// room-scoped pushes. Supervises its own connection: an immediate reconnect
/// attempt after a drop, then a fixed 5s retry indefinitely.
pub async fn start_consumer(
    client: redis::Client,
    registry: RoomRegistry,
    subscriptions: SubscriptionMap,
    mut control: UnboundedReceiver<BindCommand>,
) {
    loop {
        match client.get_async_connection().await {
            Ok(conn) => {
                match consume(conn, &registry, &subscriptions, &mut control).await {
                    Ok(()) => {
                        // Control channel closed: the hub is shutting down.
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "broker consumer connection lost; reconnecting");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "broker consumer connect failed; retrying in 5s");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

enum Next {
    Broker(redis::Msg),
    Control(Option<BindCommand>),
}

/// Pattern-subscription side of the pub/sub connection, as a seam so the
/// reconnect replay can run against a recorder in tests.
#[async_trait]
trait BindingSink {
    async fn psubscribe(&mut self, pattern: String) -> redis::RedisResult<()>;
}

#[async_trait]
impl BindingSink for redis::aio::PubSub {
    async fn psubscribe(&mut self, pattern: String) -> redis::RedisResult<()> {
        redis::aio::PubSub::psubscribe(self, pattern).await
    }
}

/// Restore the full binding set on a fresh connection: one psubscribe per
/// group with at least one local subscriber.
async fn replay_bindings<S: BindingSink>(
    subscriptions: &SubscriptionMap,
    sink: &mut S,
) -> redis::RedisResult<()> {
    for group_id in subscriptions.active_groups().await {
        sink.psubscribe(group_binding_pattern(group_id)).await?;
    }
    Ok(())
}

async fn consume(
    conn: redis::aio::Connection,
    registry: &RoomRegistry,
    subscriptions: &SubscriptionMap,
    control: &mut UnboundedReceiver<BindCommand>,
) -> redis::RedisResult<()> {
    let mut pubsub = conn.into_pubsub();
    pubsub.subscribe(FANOUT_CHANNEL).await?;
    replay_bindings(subscriptions, &mut pubsub).await?;
    tracing::info!("broker consumer connected");

    loop {
        // The message stream borrows the pub/sub connection, so it is built
        // per iteration and dropped before any subscribe call.
        let next = {
            let mut stream = pubsub.on_message();
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(msg) => Next::Broker(msg),
                    None => {
                        return Err(redis::RedisError::from((
                            redis::ErrorKind::IoError,
                            "pubsub stream closed",
                        )))
                    }
                },
                cmd = control.recv() => Next::Control(cmd),
            }
        };

        match next {
            Next::Broker(msg) => {
                let payload: String = msg.get_payload()?;
                dispatch(registry, &payload).await;
            }
            Next::Control(Some(BindCommand::Bind(group_id))) => {
                pubsub.psubscribe(group_binding_pattern(group_id)).await?;
            }
            Next::Control(Some(BindCommand::Unbind(group_id))) => {
                pubsub.punsubscribe(group_binding_pattern(group_id)).await?;
            }
            Next::Control(None) => return Ok(()),
        }
    }
}

/// Route one broker payload to the local rooms. Fan-out delivery events
/// become `newMessage` pushes; topic notifications become `groupEvent`
/// pushes. Connections outside the room never see either.
pub async fn dispatch(registry: &RoomRegistry, payload: &str) {
    if let Ok(event) = serde_json::from_str::<DeliveryEvent>(payload) {
        let out = WsOutboundEvent::NewMessage {
            message: event.message,
        };
        registry
            .broadcast(event.group_id, Message::Text(out.to_json()))
            .await;
        return;
    }
    if let Ok(event) = serde_json::from_str::<GroupNotification>(payload) {
        let group_id = event.group_id;
        let out = WsOutboundEvent::GroupEvent { event };
        registry
            .broadcast(group_id, Message::Text(out.to_json()))
            .await;
        return;
    }
    tracing::warn!(payload, "unrecognized broker payload dropped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::events::DeliveryMessage;
    use chrono::Utc;
    use tokio::sync::mpsc::unbounded_channel;
    use uuid::Uuid;

    struct RecordingSink(Vec<String>);

    #[async_trait]
    impl BindingSink for RecordingSink {
        async fn psubscribe(&mut self, pattern: String) -> redis::RedisResult<()> {
            self.0.push(pattern);
            Ok(())
        }
    }

    #[tokio::test]
    async fn reconnect_replays_one_psubscribe_per_active_group() {
        let (subs, _rx) = SubscriptionMap::new();
        let (kept, dropped) = (Uuid::new_v4(), Uuid::new_v4());

        // Two local subscribers share one binding; the other group is
        // fully unbound before the reconnect.
        subs.bind(kept).await;
        subs.bind(kept).await;
        subs.bind(dropped).await;
        subs.unbind(dropped).await;

        let mut sink = RecordingSink(Vec::new());
        replay_bindings(&subs, &mut sink).await.unwrap();

        assert_eq!(sink.0, vec![group_binding_pattern(kept)]);
    }

    #[tokio::test]
    async fn replay_with_no_active_groups_subscribes_nothing() {
        let (subs, _rx) = SubscriptionMap::new();
        let mut sink = RecordingSink(Vec::new());
        replay_bindings(&subs, &mut sink).await.unwrap();
        assert!(sink.0.is_empty());
    }

    fn delivery_payload(group_id: Uuid, sender: Uuid, content: &str) -> String {
        serde_json::to_string(&DeliveryEvent {
            group_id,
            message: DeliveryMessage {
                id: Some(Uuid::new_v4()),
                content: content.into(),
                sender,
                timestamp: Utc::now(),
            },
        })
        .unwrap()
    }

    #[tokio::test]
    async fn delivery_event_pushed_to_room_members_only() {
        let registry = RoomRegistry::new();
        let group = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let (tx_member, mut rx_member) = unbounded_channel();
        let (tx_outsider, mut rx_outsider) = unbounded_channel();
        registry.join(group, Uuid::new_v4(), tx_member).await;
        registry.join(Uuid::new_v4(), Uuid::new_v4(), tx_outsider).await;

        dispatch(&registry, &delivery_payload(group, sender, "hello")).await;

        let Message::Text(text) = rx_member.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["type"], "newMessage");
        assert_eq!(json["message"]["content"], "hello");
        assert_eq!(json["message"]["sender"], sender.to_string());

        assert!(rx_outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn notification_becomes_group_event() {
        let registry = RoomRegistry::new();
        let group = Uuid::new_v4();
        let (tx, mut rx) = unbounded_channel();
        registry.join(group, Uuid::new_v4(), tx).await;

        let payload =
            serde_json::to_string(&GroupNotification::new_message(group, Uuid::new_v4())).unwrap();
        dispatch(&registry, &payload).await;

        let Message::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["type"], "groupEvent");
        assert_eq!(json["event"]["type"], "message");
    }

    #[tokio::test]
    async fn garbage_payload_is_dropped() {
        let registry = RoomRegistry::new();
        let group = Uuid::new_v4();
        let (tx, mut rx) = unbounded_channel();
        registry.join(group, Uuid::new_v4(), tx).await;

        dispatch(&registry, "not json").await;
        assert!(rx.try_recv().is_err());
    }
}
