pub mod format;

pub use format::{format_error, format_event, format_startup};

use crate::api::MessageSink;
use crate::models::RecipientId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Chats that receive lifecycle notifications
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberSet {
    recipients: BTreeSet<RecipientId>,
}

impl SubscriberSet {
    pub fn new(seed: impl IntoIterator<Item = RecipientId>) -> Self {
        Self {
            recipients: seed.into_iter().collect(),
        }
    }

    /// Returns false if the chat was already subscribed
    pub fn subscribe(&mut self, recipient: RecipientId) -> bool {
        self.recipients.insert(recipient)
    }

    /// Returns false if the chat was not subscribed
    pub fn unsubscribe(&mut self, recipient: RecipientId) -> bool {
        self.recipients.remove(&recipient)
    }

    pub fn contains(&self, recipient: RecipientId) -> bool {
        self.recipients.contains(&recipient)
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn recipients(&self) -> Vec<RecipientId> {
        self.recipients.iter().copied().collect()
    }
}

/// Fans a message out to every subscriber
///
/// A recipient whose delivery fails is dropped from the set; the remaining
/// recipients still receive the message.
#[derive(Clone)]
pub struct Broadcaster {
    sink: Arc<dyn MessageSink>,
    subscribers: Arc<RwLock<SubscriberSet>>,
}

impl Broadcaster {
    pub fn new(sink: Arc<dyn MessageSink>, subscribers: Arc<RwLock<SubscriberSet>>) -> Self {
        Self { sink, subscribers }
    }

    pub fn subscribers(&self) -> Arc<RwLock<SubscriberSet>> {
        self.subscribers.clone()
    }

    /// Deliver `text` to all subscribers, returning the number of successful deliveries
    pub async fn broadcast(&self, text: &str) -> usize {
        // Snapshot so no lock is held across network calls
        let recipients = self.subscribers.read().await.recipients();
        if recipients.is_empty() {
            tracing::debug!("No subscribers, message not sent");
            return 0;
        }

        let mut delivered = 0;
        let mut failed = Vec::new();

        for recipient in recipients {
            match self.sink.send_message(recipient, text).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(recipient, "⚠️  Delivery failed, unsubscribing: {}", e);
                    failed.push(recipient);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for recipient in failed {
                subscribers.unsubscribe(recipient);
            }
        }

        delivered
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut set = SubscriberSet::new([10, 20]);

        assert!(set.subscribe(30));
        assert!(!set.subscribe(10));
        assert!(set.unsubscribe(20));
        assert!(!set.unsubscribe(99));

        assert_eq!(set.recipients(), vec![10, 30]);
        assert!(set.contains(30));
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let sink = Arc::new(RecordingSink::default());
        let subscribers = Arc::new(RwLock::new(SubscriberSet::new([1, 2, 3])));
        let broadcaster = Broadcaster::new(sink.clone(), subscribers);

        let delivered = broadcaster.broadcast("hello").await;

        assert_eq!(delivered, 3);
        let recipients: Vec<RecipientId> = sink.messages().iter().map(|(r, _)| *r).collect();
        assert_eq!(recipients, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_recipient_is_pruned() {
        let sink = Arc::new(RecordingSink::failing_for(&[2]));
        let subscribers = Arc::new(RwLock::new(SubscriberSet::new([1, 2, 3])));
        let broadcaster = Broadcaster::new(sink.clone(), subscribers.clone());

        let delivered = broadcaster.broadcast("hello").await;

        assert_eq!(delivered, 2);
        assert_eq!(subscribers.read().await.recipients(), vec![1, 3]);

        // Next broadcast no longer tries the pruned chat
        broadcaster.broadcast("again").await;
        assert_eq!(sink.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let sink = Arc::new(RecordingSink::default());
        let broadcaster = Broadcaster::new(sink.clone(), Arc::new(RwLock::new(SubscriberSet::default())));

        assert_eq!(broadcaster.broadcast("nobody").await, 0);
        assert!(sink.messages().is_empty());
    }
}
