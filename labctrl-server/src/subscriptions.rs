//! The Subscription Manager.
//!
//! Grounded on `original_source/linear_stage/generic/ws.py`'s
//! `WebSocketConnectionManager`: `connect`/`disconnect` mutate a
//! connection map under a lock, while `broadcast` takes a snapshot of the
//! map and iterates the snapshot — never the live map — so a client that
//! disconnects mid-broadcast can't invalidate an iterator another task is
//! walking. `WSDeviceStateUpdateSender`'s send is fire-and-forget and
//! bounded by nature of the channel it posts to; here that becomes a
//! per-subscriber `tokio::time::timeout` around the send so one wedged
//! client can't stall the whole broadcast.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;
use uuid::Uuid;

use labctrl_core::{ChannelMessage, UpdateEvent};

use crate::config::AccessLevel;

/// How long `broadcast` will wait on any single subscriber's channel before
/// giving up on that subscriber for this event.
const SEND_TIMEOUT: Duration = Duration::from_millis(200);

/// One active persistent-channel connection subscribed to a device's
/// updates. The same sender also carries direct command acks, so a session
/// has exactly one outbound channel regardless of whether a message is a
/// broadcast or a reply.
#[derive(Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub username: String,
    pub access_level: AccessLevel,
    pub sender: mpsc::Sender<ChannelMessage>,
}

#[derive(Default)]
pub struct SubscriptionManager {
    sessions: RwLock<HashMap<Uuid, SessionRecord>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, record: SessionRecord) {
        self.sessions.write().await.insert(record.id, record);
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Fan an update out to every current subscriber. Takes a snapshot of
    /// the subscriber map before sending so subscribers that connect or
    /// disconnect during the fan-out are unaffected by this call.
    pub async fn broadcast(&self, event: UpdateEvent) {
        let snapshot: Vec<SessionRecord> = self.sessions.read().await.values().cloned().collect();
        let message = ChannelMessage::Update(event);
        for session in snapshot {
            if tokio::time::timeout(SEND_TIMEOUT, session.sender.send(message.clone()))
                .await
                .is_err()
            {
                warn!(
                    session = %session.id,
                    username = %session.username,
                    "broadcast send timed out, subscriber may be wedged"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sender: mpsc::Sender<ChannelMessage>) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            username: "alice".into(),
            access_level: AccessLevel::Readonly,
            sender,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_current_subscriber() {
        let manager = SubscriptionManager::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        manager.subscribe(record(tx1)).await;
        manager.subscribe(record(tx2)).await;

        manager
            .broadcast(UpdateEvent::PositionReached { value: 42 })
            .await;

        assert!(matches!(
            rx1.recv().await.unwrap(),
            ChannelMessage::Update(UpdateEvent::PositionReached { value: 42 })
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            ChannelMessage::Update(UpdateEvent::PositionReached { value: 42 })
        ));
    }

    #[tokio::test]
    async fn unsubscribed_session_receives_nothing() {
        let manager = SubscriptionManager::new();
        let (tx, mut rx) = mpsc::channel(4);
        let rec = record(tx);
        let id = rec.id;
        manager.subscribe(rec).await;
        manager.unsubscribe(id).await;

        manager
            .broadcast(UpdateEvent::PositionReached { value: 1 })
            .await;
        assert!(rx.try_recv().is_err());
    }
}
