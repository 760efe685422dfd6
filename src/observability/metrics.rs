use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::policy::PolicyError;

/// Kind of committed policy mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
    Delete,
}

/// Metrics registry for the application.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Committed mutations by kind
    pub policies_created: AtomicU64,
    pub policies_updated: AtomicU64,
    pub policies_deleted: AtomicU64,

    /// Failed operations by class
    pub bad_requests: AtomicU64,
    pub validation_failures: AtomicU64,
    pub system_errors: AtomicU64,

    /// Change notifications
    pub notifications_published: AtomicU64,
    pub notification_errors: AtomicU64,

    /// Snapshot cache reloads
    pub cache_reloads_total: AtomicU64,
    pub cache_reload_errors: AtomicU64,

    /// Mutation latency buckets
    pub latency_under_1ms: AtomicU64,
    pub latency_1_10ms: AtomicU64,
    pub latency_10_100ms: AtomicU64,
    pub latency_over_100ms: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record a committed mutation.
    pub fn record_mutation(&self, mutation: Mutation) {
        let counter = match mutation {
            Mutation::Create => &self.policies_created,
            Mutation::Update => &self.policies_updated,
            Mutation::Delete => &self.policies_deleted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed operation.
    pub fn record_failure(&self, error: &PolicyError) {
        let counter = match error {
            PolicyError::BadRequest(_) => &self.bad_requests,
            PolicyError::Validation(_) => &self.validation_failures,
            PolicyError::System(_) => &self.system_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a change notification attempt.
    pub fn record_notification(&self, success: bool) {
        if success {
            self.notifications_published.fetch_add(1, Ordering::Relaxed);
        } else {
            self.notification_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a snapshot cache reload.
    pub fn record_cache_reload(&self, success: bool) {
        self.cache_reloads_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.cache_reload_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record mutation latency.
    pub fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;

        if micros < 1_000 {
            self.latency_under_1ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 10_000 {
            self.latency_1_10ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 100_000 {
            self.latency_10_100ms.fetch_add(1, Ordering::Relaxed);
        } else {
            self.latency_over_100ms.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP policyd_mutations_total Committed policy mutations
# TYPE policyd_mutations_total counter
policyd_mutations_total{{op="create"}} {}
policyd_mutations_total{{op="update"}} {}
policyd_mutations_total{{op="delete"}} {}

# HELP policyd_failures_total Failed policy operations by class
# TYPE policyd_failures_total counter
policyd_failures_total{{class="bad_request"}} {}
policyd_failures_total{{class="validation"}} {}
policyd_failures_total{{class="system"}} {}

# HELP policyd_notifications_total Change notifications by result
# TYPE policyd_notifications_total counter
policyd_notifications_total{{result="published"}} {}
policyd_notifications_total{{result="failed"}} {}

# HELP policyd_cache_reloads_total Snapshot cache reloads
# TYPE policyd_cache_reloads_total counter
policyd_cache_reloads_total {}

# HELP policyd_cache_reload_errors_total Snapshot cache reload errors
# TYPE policyd_cache_reload_errors_total counter
policyd_cache_reload_errors_total {}

# HELP policyd_mutation_latency_bucket Mutation latency histogram
# TYPE policyd_mutation_latency_bucket counter
policyd_mutation_latency_bucket{{le="0.001"}} {}
policyd_mutation_latency_bucket{{le="0.01"}} {}
policyd_mutation_latency_bucket{{le="0.1"}} {}
policyd_mutation_latency_bucket{{le="+Inf"}} {}
"#,
            self.policies_created.load(Ordering::Relaxed),
            self.policies_updated.load(Ordering::Relaxed),
            self.policies_deleted.load(Ordering::Relaxed),
            self.bad_requests.load(Ordering::Relaxed),
            self.validation_failures.load(Ordering::Relaxed),
            self.system_errors.load(Ordering::Relaxed),
            self.notifications_published.load(Ordering::Relaxed),
            self.notification_errors.load(Ordering::Relaxed),
            self.cache_reloads_total.load(Ordering::Relaxed),
            self.cache_reload_errors.load(Ordering::Relaxed),
            self.latency_under_1ms.load(Ordering::Relaxed),
            self.latency_1_10ms.load(Ordering::Relaxed),
            self.latency_10_100ms.load(Ordering::Relaxed),
            self.latency_over_100ms.load(Ordering::Relaxed),
        )
    }
}

/// Guard for timing operations.
pub struct TimingGuard<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        TimingGuard {
            registry,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.registry.record_latency(self.start);
    }
}
