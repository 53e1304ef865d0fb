use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Broker binding instruction for the consumer task, which owns the pub/sub
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindCommand {
    Bind(Uuid),
    Unbind(Uuid),
}

/// Per-process map from group id to subscriber-connection reference count.
///
/// The topic binding for a group is shared by the one process-wide pub/sub
/// connection across all local connections, so it is bound on the 0→1
/// transition and unbound on 1→0. Without this, one connection leaving a
/// group would cut delivery for every other local subscriber of that group.
#[derive(Clone)]
pub struct SubscriptionMap {
    counts: Arc<Mutex<HashMap<Uuid, usize>>>,
    tx: UnboundedSender<BindCommand>,
}

impl SubscriptionMap {
    pub fn new() -> (Self, UnboundedReceiver<BindCommand>) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                counts: Arc::new(Mutex::new(HashMap::new())),
                tx,
            },
            rx,
        )
    }

    pub async fn bind(&self, group_id: Uuid) {
        let mut counts = self.counts.lock().await;
        let count = counts.entry(group_id).or_insert(0);
        *count += 1;
        if *count == 1 {
            let _ = self.tx.send(BindCommand::Bind(group_id));
        }
    }

    pub async fn unbind(&self, group_id: Uuid) {
        let mut counts = self.counts.lock().await;
        match counts.get_mut(&group_id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(&group_id);
                let _ = self.tx.send(BindCommand::Unbind(group_id));
            }
            None => {}
        }
    }

    /// Groups with at least one local subscriber; replayed by the consumer
    /// after a broker reconnect.
    pub async fn active_groups(&self) -> Vec<Uuid> {
        self.counts.lock().await.keys().copied().collect()
    }
}
