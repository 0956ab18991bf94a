//! Merge notification bus.
//!
//! Typed broadcast channel the config layer publishes on and the coordinator
//! and projector subscribe to. Each subscriber gets every notification sent
//! after it subscribed.

use configsync_protocol::MergeNotification;
use tokio::sync::broadcast;

pub type NotificationReceiver = broadcast::Receiver<MergeNotification>;

#[derive(Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<MergeNotification>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> NotificationReceiver {
        self.tx.subscribe()
    }

    pub fn publish(&self, notification: MergeNotification) {
        log::trace!(target: "configsync::bus", "publish {:?}", notification);
        let _ = self.tx.send(notification);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configsync_protocol::UserConfigType;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = NotificationBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(MergeNotification::UserConfigsMerged(UserConfigType::Contacts));

        assert_eq!(
            a.recv().await.unwrap(),
            MergeNotification::UserConfigsMerged(UserConfigType::Contacts)
        );
        assert_eq!(
            b.recv().await.unwrap(),
            MergeNotification::UserConfigsMerged(UserConfigType::Contacts)
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = NotificationBus::new(1);
        bus.publish(MergeNotification::UserConfigsModified);
    }
}
