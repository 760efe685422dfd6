use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::domain::{Policy, PolicyId, ServiceId};
use crate::events::POLICY_CHANGE;
use crate::observability::MetricsRegistry;
use crate::storage::{PolicyRepository, Storage};

/// Shortest allowed periodic refresh.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Immutable view of every stored policy at one point in time.
#[derive(Debug, Default)]
pub struct PolicySnapshot {
    policies: Vec<Policy>,
    index: HashMap<PolicyId, usize>,
    loaded_at: Option<Instant>,
}

impl PolicySnapshot {
    pub fn new(policies: Vec<Policy>) -> Self {
        let index = policies
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i))
            .collect();

        PolicySnapshot {
            policies,
            index,
            loaded_at: Some(Instant::now()),
        }
    }

    /// Snapshot with no policies, used before the first load.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn get(&self, id: PolicyId) -> Option<&Policy> {
        self.index.get(&id).map(|&i| &self.policies[i])
    }

    /// Policies that apply to a service.
    pub fn for_service(&self, service: ServiceId) -> Vec<&Policy> {
        self.policies
            .iter()
            .filter(|p| p.services.contains(&service))
            .collect()
    }

    /// Policies granting a role.
    pub fn for_role(&self, role: &str) -> Vec<&Policy> {
        self.policies
            .iter()
            .filter(|p| p.roles.contains(role))
            .collect()
    }

    /// Time since this snapshot was loaded, if it ever was.
    pub fn age(&self) -> Option<Duration> {
        self.loaded_at.map(|t| t.elapsed())
    }
}

/// Keeps a [`PolicySnapshot`] current by reloading on change notifications.
pub struct PolicyCache {
    storage: Arc<dyn Storage>,
    changes: broadcast::Receiver<String>,
    refresh_interval: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl PolicyCache {
    /// Create a new cache.
    ///
    /// `changes` should be subscribed to the notifier the service publishes
    /// on. The periodic refresh catches changes made by other processes and
    /// is never shorter than [`MIN_REFRESH_INTERVAL`].
    pub fn new(
        storage: Arc<dyn Storage>,
        changes: broadcast::Receiver<String>,
        refresh_interval: Duration,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        PolicyCache {
            storage,
            changes,
            refresh_interval: refresh_interval.max(MIN_REFRESH_INTERVAL),
            metrics,
        }
    }

    /// Load the initial snapshot and start the refresh task.
    ///
    /// Returns a receiver that will observe every new snapshot.
    pub async fn start(
        mut self,
    ) -> (watch::Receiver<Arc<PolicySnapshot>>, tokio::task::JoinHandle<()>) {
        let initial = match self.load().await {
            Ok(snapshot) => {
                info!(policies = snapshot.len(), "Loaded initial policy snapshot");
                Arc::new(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Failed to load initial policy snapshot");
                Arc::new(PolicySnapshot::empty())
            }
        };

        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(self.refresh_interval);
            // The first tick completes immediately; the initial load covered it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    received = self.changes.recv() => match received {
                        Ok(topic) if topic == POLICY_CHANGE => {}
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped = skipped, "Change subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Change channel closed, stopping policy cache");
                            break;
                        }
                    },
                    _ = ticker.tick() => {}
                }

                self.refresh(&tx).await;
            }
        });

        (rx, handle)
    }

    async fn refresh(&self, tx: &watch::Sender<Arc<PolicySnapshot>>) {
        match self.load().await {
            Ok(snapshot) => {
                debug!(policies = snapshot.len(), "Policy snapshot reloaded");
                let _ = tx.send(Arc::new(snapshot));
            }
            Err(e) => warn!(error = %e, "Failed to reload policies, keeping previous snapshot"),
        }
    }

    async fn load(&self) -> anyhow::Result<PolicySnapshot> {
        let result = self.storage.get_all().await;
        self.metrics.record_cache_reload(result.is_ok());
        Ok(PolicySnapshot::new(result?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BroadcastNotifier, Notifier};
    use crate::storage::MemoryStorage;
    use std::sync::atomic::Ordering;

    fn policy(name: &str, role: &str, service: ServiceId) -> Policy {
        Policy {
            name: name.to_string(),
            roles: [role.to_string()].into_iter().collect(),
            services: [service].into_iter().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_lookups() {
        let web = ServiceId::new();
        let db = ServiceId::new();
        let mut a = policy("a", "admin", web);
        a.id = PolicyId::new();
        let mut b = policy("b", "ops", db);
        b.id = PolicyId::new();

        let snapshot = PolicySnapshot::new(vec![a.clone(), b.clone()]);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(b.id).map(|p| p.name.as_str()), Some("b"));
        assert_eq!(snapshot.for_service(web).len(), 1);
        assert_eq!(snapshot.for_role("ops")[0].id, b.id);
        assert!(snapshot.for_role("guest").is_empty());
        assert!(snapshot.age().is_some());
        assert!(PolicySnapshot::empty().age().is_none());
    }

    #[tokio::test]
    async fn test_cache_initial_load() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .insert(&policy("seed", "admin", ServiceId::new()))
            .await
            .unwrap();

        let notifier = BroadcastNotifier::new(8);
        let cache = PolicyCache::new(
            storage,
            notifier.subscribe(),
            Duration::from_secs(3600),
            Arc::new(MetricsRegistry::new()),
        );
        let (rx, handle) = cache.start().await;

        assert_eq!(rx.borrow().len(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cache_reloads_on_change() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = BroadcastNotifier::new(8);
        let metrics = Arc::new(MetricsRegistry::new());

        let cache = PolicyCache::new(
            storage.clone(),
            notifier.subscribe(),
            Duration::from_secs(3600),
            metrics.clone(),
        );
        let (mut rx, handle) = cache.start().await;
        assert!(rx.borrow().is_empty());

        storage
            .insert(&policy("late", "ops", ServiceId::new()))
            .await
            .unwrap();
        notifier.publish(POLICY_CHANGE).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(rx.borrow().len(), 1);
        assert_eq!(metrics.cache_reloads_total.load(Ordering::Relaxed), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_zero_refresh_interval_is_clamped() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = BroadcastNotifier::new(8);

        let cache = PolicyCache::new(
            storage.clone(),
            notifier.subscribe(),
            Duration::ZERO,
            Arc::new(MetricsRegistry::new()),
        );
        assert_eq!(cache.refresh_interval, MIN_REFRESH_INTERVAL);

        let (mut rx, handle) = cache.start().await;

        storage
            .insert(&policy("after", "ops", ServiceId::new()))
            .await
            .unwrap();
        notifier.publish(POLICY_CHANGE).await.unwrap();

        // A panicked refresh task would close the channel instead.
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rx.borrow().len(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_snapshot() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .insert(&policy("kept", "admin", ServiceId::new()))
            .await
            .unwrap();
        let notifier = BroadcastNotifier::new(8);
        let metrics = Arc::new(MetricsRegistry::new());

        let cache = PolicyCache::new(
            storage.clone(),
            notifier.subscribe(),
            Duration::from_secs(3600),
            metrics.clone(),
        );
        let (rx, handle) = cache.start().await;

        storage.set_unavailable(true);
        notifier.publish(POLICY_CHANGE).await.unwrap();

        for _ in 0..100 {
            if metrics.cache_reload_errors.load(Ordering::Relaxed) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(metrics.cache_reload_errors.load(Ordering::Relaxed), 1);
        assert_eq!(rx.borrow().len(), 1);

        handle.abort();
    }
}
