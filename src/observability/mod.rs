pub mod metrics;
pub mod tracing;

pub use metrics::{MetricsRegistry, Mutation, TimingGuard};
pub use tracing::init_tracing;
