use serde::{Deserialize, Serialize};
use std::fmt;

/// Final verdict for a request or a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Conclusion {
    /// Request may proceed
    Allow,
    /// Request must be blocked
    Deny,
    /// Client must complete a challenge first
    Challenge,
    /// The decision could not be made (fail-open)
    Error,
}

impl Conclusion {
    /// Parse a wire tag. Unknown or unspecified tags are `None`.
    pub fn from_tag(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ALLOW" => Some(Conclusion::Allow),
            "DENY" => Some(Conclusion::Deny),
            "CHALLENGE" => Some(Conclusion::Challenge),
            "ERROR" => Some(Conclusion::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Allow => "ALLOW",
            Conclusion::Deny => "DENY",
            Conclusion::Challenge => "CHALLENGE",
            Conclusion::Error => "ERROR",
        }
    }
}

impl Default for Conclusion {
    fn default() -> Self {
        Conclusion::Allow
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a rule's verdict is enforced or only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    #[default]
    Live,
    DryRun,
}

impl Mode {
    #[inline]
    pub fn is_dry_run(&self) -> bool {
        *self == Mode::DryRun
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Live => "LIVE",
            Mode::DryRun => "DRY_RUN",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution state of a single rule within one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleState {
    Run,
    #[default]
    NotRun,
    DryRun,
    Cached,
}

impl RuleState {
    pub fn from_tag(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "RUN" => Some(RuleState::Run),
            "NOT_RUN" => Some(RuleState::NotRun),
            "DRY_RUN" => Some(RuleState::DryRun),
            "CACHED" => Some(RuleState::Cached),
            _ => None,
        }
    }
}
