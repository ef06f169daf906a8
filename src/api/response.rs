use serde::Serialize;

use crate::domain::{Conclusion, Decision, Reason, RuleResult};

/// Response from `POST /v1/protect`.
#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub id: String,
    pub conclusion: Conclusion,

    /// Milliseconds the decision may be reused for
    pub ttl: u64,

    pub reason: Reason,
    pub results: Vec<RuleResult>,

    /// ALLOW and ERROR decisions let the request through
    pub allowed: bool,
}

impl From<&Decision> for DecisionResponse {
    fn from(decision: &Decision) -> Self {
        DecisionResponse {
            id: decision.id().to_string(),
            conclusion: decision.conclusion(),
            ttl: decision.ttl(),
            reason: decision.reason().clone(),
            results: decision.results().to_vec(),
            allowed: decision.is_allowed(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub rules: usize,
    pub cached_fingerprints: usize,
    pub uptime_secs: u64,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
        }
    }
}
