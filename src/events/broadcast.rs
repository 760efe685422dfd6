use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use super::Notifier;

/// In-process notifier backed by a broadcast channel.
///
/// Subscribers that fall behind by more than `capacity` topics observe a lag
/// error on their next receive and should treat it as "something changed".
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<String>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastNotifier { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, topic: &str) -> anyhow::Result<()> {
        // No subscribers is not a failure.
        let delivered = self.tx.send(topic.to_string()).unwrap_or(0);
        trace!(topic = topic, receivers = delivered, "Published topic");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::POLICY_CHANGE;
    use tokio::sync::broadcast::error::TryRecvError;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let notifier = BroadcastNotifier::new(4);
        assert!(notifier.publish(POLICY_CHANGE).await.is_ok());
    }

    #[tokio::test]
    async fn test_each_subscriber_sees_each_publish() {
        let notifier = BroadcastNotifier::new(4);
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        notifier.publish(POLICY_CHANGE).await.unwrap();
        notifier.publish(POLICY_CHANGE).await.unwrap();

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.try_recv().unwrap(), POLICY_CHANGE);
            assert_eq!(rx.try_recv().unwrap(), POLICY_CHANGE);
            assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        }
    }
}
