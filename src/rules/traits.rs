use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use thiserror::Error;

use crate::analyze::AnalyzeError;
use crate::client::WireRule;
use crate::domain::{Context, Mode, RequestDetails, RuleResult};
use crate::filter::FilterError;

/// Fallback when a rule error renders as an empty message.
pub const UNKNOWN_PROBLEM: &str = "Unknown problem";

/// Invalid rule options, raised when the rule is constructed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{rule}: exactly one of `allow` or `deny` must be specified")]
    AllowOrDeny { rule: &'static str },

    #[error("{rule}: `{field}` must not be empty")]
    Empty {
        rule: &'static str,
        field: &'static str,
    },

    #[error("{rule}: `{field}` must be greater than zero")]
    NotPositive {
        rule: &'static str,
        field: &'static str,
    },
}

/// Failure inside `validate` or `protect`.
///
/// The pipeline contains these: each becomes an ERROR result for its rule.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Execution(String),

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

impl RuleError {
    /// Message recorded in the ERROR result.
    pub fn message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            UNKNOWN_PROBLEM.to_string()
        } else {
            message
        }
    }
}

/// Rule family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    RateLimit,
    Bot,
    Email,
    SensitiveInfo,
    Shield,
    Filter,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::RateLimit => "RATE_LIMIT",
            RuleType::Bot => "BOT",
            RuleType::Email => "EMAIL",
            RuleType::SensitiveInfo => "SENSITIVE_INFO",
            RuleType::Shield => "SHIELD",
            RuleType::Filter => "FILTER",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for rules executed in-process.
///
/// Rules run strictly in priority order. `validate` is synchronous and
/// cheap; `protect` is the only suspension point per rule and must bound
/// any I/O it performs.
#[async_trait]
pub trait LocalRule: Send + Sync + Debug {
    fn rule_type(&self) -> RuleType;

    fn mode(&self) -> Mode;

    /// Lower runs first.
    fn priority(&self) -> u32;

    /// Check the request carries what this rule needs.
    fn validate(&self, ctx: &Context, details: &RequestDetails) -> Result<(), RuleError>;

    /// Evaluate the rule against a request.
    async fn protect(&self, ctx: &Context, details: &RequestDetails)
        -> Result<RuleResult, RuleError>;

    /// Serialized form sent to the remote service.
    fn to_wire(&self) -> WireRule;

    /// `extra` keys holding data that must never leave the process.
    fn local_only_fields(&self) -> &[&'static str] {
        &[]
    }
}
