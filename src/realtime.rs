//! Change notifications
//!
//! The record service hands a [`Message`] to a [`Broadcaster`] after every
//! successful mutation. [`Hub`] fans messages out over a tokio broadcast
//! channel; sending never blocks and slow subscribers lag instead of stalling
//! writers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::record::Record;

/// Default number of messages buffered per subscriber
pub const DEFAULT_HUB_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// One record change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub action: ChangeAction,
    pub collection: String,
    pub record: Record,
}

impl Message {
    pub fn new(action: ChangeAction, record: Record) -> Self {
        Self {
            action,
            collection: record.collection.clone(),
            record,
        }
    }
}

/// Receiver of change messages; implementations must not block
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, message: Message);
}

/// In-process fan-out to any number of subscribers
#[derive(Debug, Clone)]
pub struct Hub {
    sender: broadcast::Sender<Message>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

impl Broadcaster for Hub {
    fn broadcast(&self, message: Message) {
        // Err only means nobody is listening
        if self.sender.send(message).is_err() {
            tracing::trace!("realtime message dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> Record {
        let mut record = Record::new("posts");
        record.id = id.to_string();
        record
    }

    #[tokio::test]
    async fn test_subscribers_receive_messages() {
        let hub = Hub::default();
        let mut rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        hub.broadcast(Message::new(ChangeAction::Create, record("p1")));

        let msg = rx.recv().await.expect("Should receive message");
        assert_eq!(msg.action, ChangeAction::Create);
        assert_eq!(msg.collection, "posts");
        assert_eq!(msg.record.id, "p1");
    }

    #[test]
    fn test_broadcast_without_subscribers_does_not_block() {
        let hub = Hub::new(1);
        for i in 0..10 {
            hub.broadcast(Message::new(ChangeAction::Delete, record(&i.to_string())));
        }
    }

    #[tokio::test]
    async fn test_full_buffer_lags_instead_of_blocking() {
        let hub = Hub::new(2);
        let mut rx = hub.subscribe();
        for i in 0..5 {
            hub.broadcast(Message::new(ChangeAction::Update, record(&i.to_string())));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.expect("Should receive").record.id, "3");
    }

    #[test]
    fn test_message_json_shape() {
        let value = serde_json::to_value(Message::new(ChangeAction::Update, record("p1"))).unwrap();
        assert_eq!(value["action"], "update");
        assert_eq!(value["collection"], "posts");
        assert_eq!(value["record"]["id"], "p1");
    }
}
