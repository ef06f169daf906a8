use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Conclusion, Decision, EmailType, Mode, Reason, RequestDetails, RuleResult, RuleState};

/// Rate limiting algorithm enforced by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateLimitAlgorithm {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
}

/// A rule as sent to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireRule {
    RateLimit {
        mode: Mode,
        algorithm: RateLimitAlgorithm,
        /// Requests per window, or bucket capacity
        max: u32,
        /// Window or refill interval in seconds
        window: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refill_rate: Option<u32>,
        #[serde(default)]
        characteristics: Vec<String>,
    },
    Bot {
        mode: Mode,
        #[serde(default)]
        allow: Vec<String>,
        #[serde(default)]
        deny: Vec<String>,
    },
    Email {
        mode: Mode,
        #[serde(default)]
        allow: Vec<EmailType>,
        #[serde(default)]
        deny: Vec<EmailType>,
        require_top_level_domain: bool,
        allow_domain_literal: bool,
    },
    SensitiveInfo {
        mode: Mode,
        #[serde(default)]
        allow: Vec<String>,
        #[serde(default)]
        deny: Vec<String>,
    },
    Shield {
        mode: Mode,
        #[serde(default)]
        characteristics: Vec<String>,
    },
    Filter {
        mode: Mode,
        #[serde(default)]
        allow: Vec<String>,
        #[serde(default)]
        deny: Vec<String>,
    },
}

/// Request details as sent to the remote service.
///
/// Headers are flattened to one value per name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDetails {
    pub ip: String,
    pub method: String,
    pub protocol: String,
    pub host: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: String,
    pub query: String,
    pub extra: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl From<&RequestDetails> for WireDetails {
    fn from(details: &RequestDetails) -> Self {
        WireDetails {
            ip: details.ip.clone(),
            method: details.method.clone(),
            protocol: details.protocol.clone(),
            host: details.host.clone(),
            path: details.path.clone(),
            headers: details.headers.flatten(),
            cookies: details.cookies.clone(),
            query: details.query.clone(),
            extra: details.extra.clone(),
            email: details.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecideRequest {
    pub sdk_stack: String,
    pub sdk_version: String,
    pub fingerprint: String,
    pub details: WireDetails,
    pub rules: Vec<WireRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub sdk_stack: String,
    pub sdk_version: String,
    pub fingerprint: String,
    pub details: WireDetails,
    pub decision: WireDecision,
    pub rules: Vec<WireRule>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecideResponse {
    #[serde(default)]
    pub decision: Option<WireDecision>,
}

/// Loosely typed decision so unknown tags decode instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireDecision {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub reason: Option<serde_json::Value>,
    #[serde(default)]
    pub rule_results: Vec<WireRuleResult>,
    #[serde(default)]
    pub ttl: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRuleResult {
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub reason: Option<serde_json::Value>,
    #[serde(default)]
    pub ttl: u64,
}

/// Decode a reason, falling back to `Generic` for unknown shapes.
fn decode_reason(value: Option<serde_json::Value>) -> Reason {
    value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn encode_reason(reason: &Reason) -> Option<serde_json::Value> {
    serde_json::to_value(reason).ok()
}

impl From<WireRuleResult> for RuleResult {
    fn from(wire: WireRuleResult) -> Self {
        let conclusion = Conclusion::from_tag(&wire.conclusion).unwrap_or(Conclusion::Error);
        let reason = match (conclusion, decode_reason(wire.reason)) {
            (Conclusion::Error, reason @ Reason::Error { .. }) => reason,
            (Conclusion::Error, _) => Reason::error("Unknown error occurred"),
            (_, reason) => reason,
        };

        RuleResult {
            rule_id: wire.rule_id,
            ttl: wire.ttl,
            state: RuleState::from_tag(&wire.state).unwrap_or_default(),
            conclusion,
            reason,
        }
    }
}

impl From<&RuleResult> for WireRuleResult {
    fn from(result: &RuleResult) -> Self {
        WireRuleResult {
            rule_id: result.rule_id.clone(),
            state: serde_json::to_value(result.state)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            conclusion: result.conclusion.as_str().to_string(),
            reason: encode_reason(&result.reason),
            ttl: result.ttl,
        }
    }
}

impl From<WireDecision> for Decision {
    /// Unknown or unspecified conclusions become ERROR decisions.
    fn from(wire: WireDecision) -> Self {
        let conclusion = Conclusion::from_tag(&wire.conclusion).unwrap_or(Conclusion::Error);
        let results = wire.rule_results.into_iter().map(RuleResult::from).collect();

        Decision::from_remote(wire.id, wire.ttl, conclusion, decode_reason(wire.reason), results)
    }
}

impl From<&Decision> for WireDecision {
    fn from(decision: &Decision) -> Self {
        WireDecision {
            id: decision.id().to_string(),
            conclusion: decision.conclusion().as_str().to_string(),
            reason: encode_reason(decision.reason()),
            rule_results: decision.results().iter().map(WireRuleResult::from).collect(),
            ttl: decision.ttl(),
        }
    }
}
