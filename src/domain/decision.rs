use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Conclusion, Reason, RuleState};

/// Result of running (or not running) a single rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,

    /// Milliseconds this result may be reused for
    pub ttl: u64,

    pub state: RuleState,
    pub conclusion: Conclusion,
    pub reason: Reason,
}

impl RuleResult {
    /// Placeholder for a rule that has not been executed.
    pub fn not_run() -> Self {
        RuleResult {
            rule_id: local_id("lrr"),
            ttl: 0,
            state: RuleState::NotRun,
            conclusion: Conclusion::Allow,
            reason: Reason::Generic,
        }
    }

    /// A result produced by running a rule.
    pub fn run(ttl: u64, conclusion: Conclusion, reason: Reason) -> Self {
        RuleResult {
            rule_id: local_id("lrr"),
            ttl,
            state: RuleState::Run,
            conclusion,
            reason,
        }
    }

    /// An error result for a rule that failed validation or execution.
    pub fn error(message: impl Into<String>) -> Self {
        RuleResult::run(0, Conclusion::Error, Reason::error(message))
    }

    #[inline]
    pub fn is_denied(&self) -> bool {
        self.conclusion == Conclusion::Deny
    }
}

impl Default for RuleResult {
    fn default() -> Self {
        RuleResult::not_run()
    }
}

/// Final verdict for one request.
///
/// Built through one constructor per conclusion so the reason always
/// matches the conclusion: an ERROR decision always carries an error reason
/// and no other conclusion does.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    id: String,
    ttl: u64,
    conclusion: Conclusion,
    reason: Reason,
    results: Vec<RuleResult>,
}

impl Decision {
    pub fn allow(ttl: u64, reason: Reason, results: Vec<RuleResult>) -> Self {
        Decision::build(local_id("lreq"), ttl, Conclusion::Allow, reason, results)
    }

    pub fn deny(ttl: u64, reason: Reason, results: Vec<RuleResult>) -> Self {
        Decision::build(local_id("lreq"), ttl, Conclusion::Deny, reason, results)
    }

    pub fn challenge(ttl: u64, reason: Reason, results: Vec<RuleResult>) -> Self {
        Decision::build(local_id("lreq"), ttl, Conclusion::Challenge, reason, results)
    }

    pub fn error(message: impl Into<String>, results: Vec<RuleResult>) -> Self {
        Decision::build(
            local_id("lreq"),
            0,
            Conclusion::Error,
            Reason::error(message),
            results,
        )
    }

    /// Rebuild a decision received from the remote service, keeping its id.
    pub fn from_remote(
        id: String,
        ttl: u64,
        conclusion: Conclusion,
        reason: Reason,
        results: Vec<RuleResult>,
    ) -> Self {
        Decision::build(id, ttl, conclusion, reason, results)
    }

    /// An ERROR conclusion without an error reason gets a generic error
    /// message and a zero ttl; an error reason on any other conclusion
    /// becomes `Generic`.
    fn build(
        id: String,
        ttl: u64,
        conclusion: Conclusion,
        reason: Reason,
        results: Vec<RuleResult>,
    ) -> Self {
        let reason = match (conclusion, reason) {
            (Conclusion::Error, reason @ Reason::Error { .. }) => reason,
            (Conclusion::Error, _) => Reason::error("Unknown error occurred"),
            (_, Reason::Error { .. }) => Reason::Generic,
            (_, reason) => reason,
        };
        let ttl = if conclusion == Conclusion::Error { 0 } else { ttl };

        Decision {
            id,
            ttl,
            conclusion,
            reason,
            results,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Milliseconds this decision may be cached for.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub fn conclusion(&self) -> Conclusion {
        self.conclusion
    }

    pub fn reason(&self) -> &Reason {
        &self.reason
    }

    pub fn results(&self) -> &[RuleResult] {
        &self.results
    }

    /// True for ALLOW and ERROR: errors fail open.
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self.conclusion, Conclusion::Allow | Conclusion::Error)
    }

    #[inline]
    pub fn is_denied(&self) -> bool {
        self.conclusion == Conclusion::Deny
    }

    #[inline]
    pub fn is_challenged(&self) -> bool {
        self.conclusion == Conclusion::Challenge
    }

    #[inline]
    pub fn is_errored(&self) -> bool {
        self.conclusion == Conclusion::Error
    }
}

fn local_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_decision_is_allowed() {
        let decision = Decision::error("timeout", vec![]);

        assert!(decision.is_allowed());
        assert!(decision.is_errored());
        assert_eq!(decision.reason().message(), Some("timeout"));
        assert_eq!(decision.ttl(), 0);
    }

    #[test]
    fn test_deny_decision() {
        let decision = Decision::deny(5000, Reason::Shield { shield_triggered: true }, vec![]);

        assert!(decision.is_denied());
        assert!(!decision.is_allowed());
        assert!(decision.id().starts_with("lreq_"));
    }

    #[test]
    fn test_remote_error_without_error_reason() {
        let decision = Decision::from_remote(
            "req_123".to_string(),
            60_000,
            Conclusion::Error,
            Reason::Generic,
            vec![],
        );

        assert_eq!(decision.id(), "req_123");
        assert_eq!(decision.reason().message(), Some("Unknown error occurred"));
        assert_eq!(decision.ttl(), 0);
    }

    #[test]
    fn test_error_reason_needs_error_conclusion() {
        let deny = Decision::deny(1000, Reason::error("boom"), vec![]);
        assert_eq!(deny.reason(), &Reason::Generic);
        assert_eq!(deny.ttl(), 1000);

        let allow = Decision::allow(0, Reason::error("boom"), vec![]);
        assert_eq!(allow.reason(), &Reason::Generic);

        let remote = Decision::from_remote(
            "req_456".to_string(),
            0,
            Conclusion::Challenge,
            Reason::error("boom"),
            vec![],
        );
        assert!(remote.is_challenged());
        assert_eq!(remote.reason(), &Reason::Generic);
        assert_eq!(remote.reason().message(), None);
    }

    #[test]
    fn test_rule_result_defaults() {
        let result = RuleResult::default();

        assert_eq!(result.state, RuleState::NotRun);
        assert_eq!(result.conclusion, Conclusion::Allow);
        assert_eq!(result.reason, Reason::Generic);
        assert!(result.rule_id.starts_with("lrr_"));
    }
}
