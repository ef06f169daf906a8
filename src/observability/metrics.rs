use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::{Conclusion, Decision};

/// Metrics registry for the pipeline.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Total protect calls
    pub decisions_total: AtomicU64,

    /// Decisions by conclusion
    pub decisions_allow: AtomicU64,
    pub decisions_deny: AtomicU64,
    pub decisions_challenge: AtomicU64,
    pub decisions_error: AtomicU64,

    /// Protect latency buckets
    pub latency_under_1ms: AtomicU64,
    pub latency_1_10ms: AtomicU64,
    pub latency_10_50ms: AtomicU64,
    pub latency_50_100ms: AtomicU64,
    pub latency_100_500ms: AtomicU64,
    pub latency_over_500ms: AtomicU64,

    /// Local rule executions
    pub rules_evaluated_total: AtomicU64,
    pub rules_denied_total: AtomicU64,
    pub rules_errored_total: AtomicU64,

    /// Denials served from the outcome cache
    pub cache_hits_total: AtomicU64,

    /// Remote decide calls
    pub remote_calls_total: AtomicU64,
    pub remote_failures_total: AtomicU64,

    /// Background reports
    pub reports_total: AtomicU64,
    pub report_failures_total: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record a decision outcome.
    pub fn record_decision(&self, decision: &Decision) {
        self.decisions_total.fetch_add(1, Ordering::Relaxed);

        let counter = match decision.conclusion() {
            Conclusion::Allow => &self.decisions_allow,
            Conclusion::Deny => &self.decisions_deny,
            Conclusion::Challenge => &self.decisions_challenge,
            Conclusion::Error => &self.decisions_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record protect latency.
    pub fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;

        let bucket = if micros < 1_000 {
            &self.latency_under_1ms
        } else if micros < 10_000 {
            &self.latency_1_10ms
        } else if micros < 50_000 {
            &self.latency_10_50ms
        } else if micros < 100_000 {
            &self.latency_50_100ms
        } else if micros < 500_000 {
            &self.latency_100_500ms
        } else {
            &self.latency_over_500ms
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a local rule execution.
    pub fn record_rule_evaluation(&self, conclusion: Conclusion) {
        self.rules_evaluated_total.fetch_add(1, Ordering::Relaxed);
        match conclusion {
            Conclusion::Deny => {
                self.rules_denied_total.fetch_add(1, Ordering::Relaxed);
            }
            Conclusion::Error => {
                self.rules_errored_total.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a remote decide call.
    pub fn record_remote_call(&self, success: bool) {
        self.remote_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.remote_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a background report.
    pub fn record_report(&self, success: bool) {
        self.reports_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.report_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP arcjet_decisions_total Total number of protect calls
# TYPE arcjet_decisions_total counter
arcjet_decisions_total {}

# HELP arcjet_decisions Decisions by conclusion
# TYPE arcjet_decisions counter
arcjet_decisions{{conclusion="allow"}} {}
arcjet_decisions{{conclusion="deny"}} {}
arcjet_decisions{{conclusion="challenge"}} {}
arcjet_decisions{{conclusion="error"}} {}

# HELP arcjet_decision_latency_bucket Protect latency histogram
# TYPE arcjet_decision_latency_bucket counter
arcjet_decision_latency_bucket{{le="0.001"}} {}
arcjet_decision_latency_bucket{{le="0.01"}} {}
arcjet_decision_latency_bucket{{le="0.05"}} {}
arcjet_decision_latency_bucket{{le="0.1"}} {}
arcjet_decision_latency_bucket{{le="0.5"}} {}
arcjet_decision_latency_bucket{{le="+Inf"}} {}

# HELP arcjet_rules_evaluated_total Local rule executions
# TYPE arcjet_rules_evaluated_total counter
arcjet_rules_evaluated_total {}

# HELP arcjet_rules_denied_total Local rule executions that denied
# TYPE arcjet_rules_denied_total counter
arcjet_rules_denied_total {}

# HELP arcjet_rules_errored_total Local rule executions that errored
# TYPE arcjet_rules_errored_total counter
arcjet_rules_errored_total {}

# HELP arcjet_cache_hits_total Denials served from the outcome cache
# TYPE arcjet_cache_hits_total counter
arcjet_cache_hits_total {}

# HELP arcjet_remote_calls_total Remote decide calls
# TYPE arcjet_remote_calls_total counter
arcjet_remote_calls_total {}

# HELP arcjet_remote_failures_total Remote decide calls that failed or timed out
# TYPE arcjet_remote_failures_total counter
arcjet_remote_failures_total {}

# HELP arcjet_reports_total Background reports
# TYPE arcjet_reports_total counter
arcjet_reports_total {}

# HELP arcjet_report_failures_total Background reports that failed
# TYPE arcjet_report_failures_total counter
arcjet_report_failures_total {}
"#,
            self.decisions_total.load(Ordering::Relaxed),
            self.decisions_allow.load(Ordering::Relaxed),
            self.decisions_deny.load(Ordering::Relaxed),
            self.decisions_challenge.load(Ordering::Relaxed),
            self.decisions_error.load(Ordering::Relaxed),
            self.latency_under_1ms.load(Ordering::Relaxed),
            self.latency_1_10ms.load(Ordering::Relaxed),
            self.latency_10_50ms.load(Ordering::Relaxed),
            self.latency_50_100ms.load(Ordering::Relaxed),
            self.latency_100_500ms.load(Ordering::Relaxed),
            self.latency_over_500ms.load(Ordering::Relaxed),
            self.rules_evaluated_total.load(Ordering::Relaxed),
            self.rules_denied_total.load(Ordering::Relaxed),
            self.rules_errored_total.load(Ordering::Relaxed),
            self.cache_hits_total.load(Ordering::Relaxed),
            self.remote_calls_total.load(Ordering::Relaxed),
            self.remote_failures_total.load(Ordering::Relaxed),
            self.reports_total.load(Ordering::Relaxed),
            self.report_failures_total.load(Ordering::Relaxed),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Reason;

    #[test]
    fn test_record_decision() {
        let metrics = MetricsRegistry::new();

        metrics.record_decision(&Decision::allow(0, Reason::Generic, vec![]));
        metrics.record_decision(&Decision::allow(0, Reason::Generic, vec![]));
        metrics.record_decision(&Decision::error("boom", vec![]));

        assert_eq!(metrics.decisions_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.decisions_allow.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.decisions_error.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_timing_guard() {
        let metrics = MetricsRegistry::new();

        {
            let _guard = TimingGuard::new(&metrics);
        }

        assert_eq!(metrics.latency_under_1ms.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_rule_and_remote_counters() {
        let metrics = MetricsRegistry::new();

        metrics.record_rule_evaluation(Conclusion::Deny);
        metrics.record_rule_evaluation(Conclusion::Allow);
        metrics.record_remote_call(false);
        metrics.record_report(true);

        assert_eq!(metrics.rules_evaluated_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.rules_denied_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.remote_failures_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.report_failures_total.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = MetricsRegistry::new();
        metrics.record_decision(&Decision::deny(1000, Reason::Generic, vec![]));
        metrics.record_cache_hit();

        let output = metrics.to_prometheus();

        assert!(output.contains("arcjet_decisions_total 1"));
        assert!(output.contains("arcjet_decisions{conclusion=\"deny\"} 1"));
        assert!(output.contains("arcjet_cache_hits_total 1"));
    }
}
