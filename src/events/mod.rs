pub mod broadcast;
pub mod postgres;

pub use broadcast::BroadcastNotifier;
pub use postgres::PgNotifier;

use async_trait::async_trait;
use std::sync::Arc;

/// Topic announced after every committed policy mutation.
pub const POLICY_CHANGE: &str = "policy.change";

/// Fire-and-forget change announcement.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str) -> anyhow::Result<()>;
}

/// Publishes to every inner notifier, failing if any of them fails.
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        FanoutNotifier { targets }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn publish(&self, topic: &str) -> anyhow::Result<()> {
        let mut first_error = None;

        for target in &self.targets {
            if let Err(e) = target.publish(topic).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
