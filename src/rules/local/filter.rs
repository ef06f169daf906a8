use async_trait::async_trait;

use crate::client::WireRule;
use crate::domain::{Conclusion, Context, Mode, Reason, RequestDetails, RuleResult};
use crate::filter::{evaluate_all, Expression, FilterError, FILTER_LOCAL_KEY};
use crate::rules::priority;
use crate::rules::traits::{ConfigError, LocalRule, RuleError, RuleType};

const RULE_NAME: &str = "filter";

/// Whether matching expressions allow or deny the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Allow,
    Deny,
}

/// Filter rule.
///
/// Matches requests against boolean expressions. In allow mode a request
/// is denied unless an expression matches or cannot be determined; in
/// deny mode it is denied when any expression matches.
#[derive(Debug)]
pub struct FilterRule {
    mode: Mode,
    priority: u32,
    action: FilterAction,
    sources: Vec<String>,
    /// Compile errors surface per request as ERROR results
    compiled: Result<Vec<Expression>, FilterError>,
}

impl FilterRule {
    /// Create a new filter rule from `allow` or `deny` expressions.
    ///
    /// Exactly one of the two must be given and it must not be empty.
    pub fn new(
        mode: Mode,
        allow: Option<Vec<String>>,
        deny: Option<Vec<String>>,
    ) -> Result<Self, ConfigError> {
        let (action, sources) = match (allow, deny) {
            (Some(allow), None) => (FilterAction::Allow, allow),
            (None, Some(deny)) => (FilterAction::Deny, deny),
            _ => return Err(ConfigError::AllowOrDeny { rule: RULE_NAME }),
        };

        if sources.is_empty() {
            let field = match action {
                FilterAction::Allow => "allow",
                FilterAction::Deny => "deny",
            };
            return Err(ConfigError::Empty {
                rule: RULE_NAME,
                field,
            });
        }

        let compiled = sources
            .iter()
            .map(|source| Expression::parse(source.as_str()))
            .collect();

        Ok(FilterRule {
            mode,
            priority: priority::FILTER,
            action,
            sources,
            compiled,
        })
    }

    pub fn allow<I, S>(mode: Mode, expressions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterRule::new(mode, Some(expressions.into_iter().map(Into::into).collect()), None)
    }

    pub fn deny<I, S>(mode: Mode, expressions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterRule::new(mode, None, Some(expressions.into_iter().map(Into::into).collect()))
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn action(&self) -> FilterAction {
        self.action
    }
}

#[async_trait]
impl LocalRule for FilterRule {
    fn rule_type(&self) -> RuleType {
        RuleType::Filter
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn validate(&self, _ctx: &Context, _details: &RequestDetails) -> Result<(), RuleError> {
        Ok(())
    }

    async fn protect(
        &self,
        _ctx: &Context,
        details: &RequestDetails,
    ) -> Result<RuleResult, RuleError> {
        let expressions = self.compiled.as_ref().map_err(|e| RuleError::Filter(e.clone()))?;
        let outcome = evaluate_all(expressions, details);

        let allowed = match self.action {
            FilterAction::Allow => !outcome.matched.is_empty() || !outcome.undetermined.is_empty(),
            FilterAction::Deny => outcome.matched.is_empty(),
        };
        let conclusion = if allowed {
            Conclusion::Allow
        } else {
            Conclusion::Deny
        };

        Ok(RuleResult::run(
            0,
            conclusion,
            Reason::filter(outcome.matched, outcome.undetermined),
        ))
    }

    fn to_wire(&self) -> WireRule {
        let (allow, deny) = match self.action {
            FilterAction::Allow => (self.sources.clone(), Vec::new()),
            FilterAction::Deny => (Vec::new(), self.sources.clone()),
        };
        WireRule::Filter {
            mode: self.mode,
            allow,
            deny,
        }
    }

    fn local_only_fields(&self) -> &[&'static str] {
        &[FILTER_LOCAL_KEY]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::MockAnalyzer;
    use crate::domain::{IpDetails, RuleState};
    use crate::rules::test_context;
    use std::sync::Arc;

    fn request(method: &str) -> RequestDetails {
        RequestDetails {
            ip: "198.51.100.7".to_string(),
            method: method.to_string(),
            host: "example.com".to_string(),
            path: "/signup".to_string(),
            ..Default::default()
        }
    }

    fn matched(result: &RuleResult) -> (Vec<String>, Vec<String>) {
        match &result.reason {
            Reason::Filter {
                matched_expressions,
                undetermined_expressions,
            } => (matched_expressions.clone(), undetermined_expressions.clone()),
            other => panic!("expected filter reason, got {:?}", other),
        }
    }

    #[test]
    fn test_requires_exactly_one_list() {
        let both = FilterRule::new(Mode::Live, Some(vec!["ip.src.vpn".into()]), Some(vec![]));
        assert_eq!(both.unwrap_err(), ConfigError::AllowOrDeny { rule: "filter" });

        let neither = FilterRule::new(Mode::Live, None, None);
        assert!(matches!(neither, Err(ConfigError::AllowOrDeny { .. })));

        let empty = FilterRule::deny(Mode::Live, Vec::<String>::new());
        assert_eq!(
            empty.unwrap_err(),
            ConfigError::Empty {
                rule: "filter",
                field: "deny"
            }
        );
    }

    #[tokio::test]
    async fn test_allow_get_only() {
        let rule = FilterRule::allow(Mode::Live, [r#"http.request.method == "GET""#]).unwrap();
        let ctx = test_context(Arc::new(MockAnalyzer::new()));

        let result = rule.protect(&ctx, &request("GET")).await.unwrap();
        assert_eq!(result.conclusion, Conclusion::Allow);
        assert_eq!(result.state, RuleState::Run);
        assert_eq!(result.ttl, 0);
        assert_eq!(matched(&result).0, vec![r#"http.request.method == "GET""#.to_string()]);

        let result = rule.protect(&ctx, &request("POST")).await.unwrap();
        assert_eq!(result.conclusion, Conclusion::Deny);
        assert_eq!(result.ttl, 0);
        assert!(matched(&result).0.is_empty());
    }

    #[tokio::test]
    async fn test_undetermined_allows_in_allow_mode() {
        let rule = FilterRule::allow(Mode::Live, ["ip.src.vpn"]).unwrap();
        let ctx = test_context(Arc::new(MockAnalyzer::new()));

        let result = rule.protect(&ctx, &request("GET")).await.unwrap();

        assert_eq!(result.conclusion, Conclusion::Allow);
        let (matched, undetermined) = matched(&result);
        assert!(matched.is_empty());
        assert_eq!(undetermined, vec!["ip.src.vpn".to_string()]);
    }

    #[tokio::test]
    async fn test_deny_mode() {
        let rule = FilterRule::deny(Mode::Live, ["ip.src.vpn", "ip.src.tor"]).unwrap();
        let ctx = test_context(Arc::new(MockAnalyzer::new()));

        let mut details = request("GET");
        let result = rule.protect(&ctx, &details).await.unwrap();
        assert_eq!(result.conclusion, Conclusion::Allow);

        details.ip_details = Some(IpDetails {
            vpn: Some(true),
            tor: Some(false),
            ..Default::default()
        });
        let result = rule.protect(&ctx, &details).await.unwrap();
        assert_eq!(result.conclusion, Conclusion::Deny);
        assert_eq!(matched(&result).0, vec!["ip.src.vpn".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_an_error() {
        let rule = FilterRule::allow(Mode::Live, [r#"http.blob ~ "x""#]).unwrap();
        let ctx = test_context(Arc::new(MockAnalyzer::new()));

        let err = rule.protect(&ctx, &request("GET")).await.unwrap_err();

        assert!(err.message().contains("unknown identifier"));
    }

    #[test]
    fn test_wire_form_and_local_fields() {
        let rule = FilterRule::deny(Mode::DryRun, [r#"local["plan"] == "free""#]).unwrap();

        assert_eq!(rule.local_only_fields(), &[FILTER_LOCAL_KEY]);
        assert_eq!(
            rule.to_wire(),
            WireRule::Filter {
                mode: Mode::DryRun,
                allow: vec![],
                deny: vec![r#"local["plan"] == "free""#.to_string()],
            }
        );
    }
}
