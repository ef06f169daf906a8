pub mod compose;
pub mod local;
pub mod remote;
pub mod traits;

pub use compose::{compose, ComposedRules, MAX_RULES, OVERLOAD_MESSAGE};
pub use local::{BotRule, EmailRule, FilterAction, FilterRule, SensitiveInfoRule};
pub use remote::{RemoteKind, RemoteRule};
pub use traits::{ConfigError, LocalRule, RuleError, RuleType, UNKNOWN_PROBLEM};

use std::sync::Arc;

use crate::client::WireRule;
use crate::domain::Mode;

/// Default priorities. Lower runs first.
pub mod priority {
    pub const SENSITIVE_INFO: u32 = 1;
    pub const RATE_LIMIT: u32 = 2;
    pub const BOT: u32 = 3;
    pub const EMAIL: u32 = 4;
    pub const SHIELD: u32 = 5;
    pub const FILTER: u32 = 6;
}

/// A configured rule.
///
/// Whether a rule runs locally or only remotely is decided by its
/// constructor.
#[derive(Debug, Clone)]
pub enum Rule {
    Local(Arc<dyn LocalRule>),
    Remote(RemoteRule),
}

impl Rule {
    pub fn local(rule: impl LocalRule + 'static) -> Self {
        Rule::Local(Arc::new(rule))
    }

    pub fn mode(&self) -> Mode {
        match self {
            Rule::Local(rule) => rule.mode(),
            Rule::Remote(rule) => rule.mode(),
        }
    }

    pub fn priority(&self) -> u32 {
        match self {
            Rule::Local(rule) => rule.priority(),
            Rule::Remote(rule) => rule.priority(),
        }
    }

    pub fn rule_type(&self) -> RuleType {
        match self {
            Rule::Local(rule) => rule.rule_type(),
            Rule::Remote(rule) => rule.rule_type(),
        }
    }

    pub fn to_wire(&self) -> WireRule {
        match self {
            Rule::Local(rule) => rule.to_wire(),
            Rule::Remote(rule) => rule.to_wire(),
        }
    }

    pub fn as_local(&self) -> Option<&Arc<dyn LocalRule>> {
        match self {
            Rule::Local(rule) => Some(rule),
            Rule::Remote(_) => None,
        }
    }
}

impl From<RemoteRule> for Rule {
    fn from(rule: RemoteRule) -> Self {
        Rule::Remote(rule)
    }
}

#[cfg(test)]
pub(crate) fn test_context(analyzer: Arc<dyn crate::analyze::Analyzer>) -> crate::domain::Context {
    use crate::cache::OutcomeCache;

    crate::domain::Context::new(
        "ajkey_test",
        "fp::test",
        Arc::from(Vec::<String>::new()),
        Arc::new(OutcomeCache::new()),
        analyzer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_dispatch() {
        let local = Rule::local(FilterRule::allow(Mode::DryRun, ["ip.src.vpn"]).unwrap());
        let remote = Rule::from(RemoteRule::sliding_window(Mode::Live, 5, 10).unwrap());

        assert_eq!(local.rule_type(), RuleType::Filter);
        assert_eq!(local.mode(), Mode::DryRun);
        assert_eq!(local.priority(), priority::FILTER);
        assert!(local.as_local().is_some());

        assert_eq!(remote.rule_type(), RuleType::RateLimit);
        assert!(remote.as_local().is_none());
        assert!(matches!(remote.to_wire(), WireRule::RateLimit { .. }));
    }
}
