pub mod metrics;
pub mod tracing;

pub use metrics::{MetricsRegistry, TimingGuard};
pub use self::tracing::init_tracing;
#[cfg(test)]
pub use self::tracing::init_test_tracing;
