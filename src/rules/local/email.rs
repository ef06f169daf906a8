use async_trait::async_trait;

use crate::analyze::EmailOptions;
use crate::client::WireRule;
use crate::domain::{Conclusion, Context, EmailType, Mode, Reason, RequestDetails, RuleResult};
use crate::rules::priority;
use crate::rules::traits::{ConfigError, LocalRule, RuleError, RuleType};

/// Email validation rule.
///
/// Classifies `details.email` and denies when a classification is on the
/// deny list, or (with an allow list) when any classification is not on it.
#[derive(Debug)]
pub struct EmailRule {
    mode: Mode,
    priority: u32,
    allow_list: bool,
    types: Vec<EmailType>,
    options: EmailOptions,
}

impl EmailRule {
    pub fn new(
        mode: Mode,
        allow: Option<Vec<EmailType>>,
        deny: Option<Vec<EmailType>>,
    ) -> Result<Self, ConfigError> {
        let (allow_list, types) = match (allow, deny) {
            (Some(allow), None) => (true, allow),
            (None, Some(deny)) if deny.is_empty() => {
                return Err(ConfigError::Empty {
                    rule: "email",
                    field: "deny",
                })
            }
            (None, Some(deny)) => (false, deny),
            _ => return Err(ConfigError::AllowOrDeny { rule: "email" }),
        };

        Ok(EmailRule {
            mode,
            priority: priority::EMAIL,
            allow_list,
            types,
            options: EmailOptions::default(),
        })
    }

    pub fn with_options(mut self, options: EmailOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    fn is_denied(&self, email_type: &EmailType) -> bool {
        self.types.contains(email_type) != self.allow_list
    }
}

#[async_trait]
impl LocalRule for EmailRule {
    fn rule_type(&self) -> RuleType {
        RuleType::Email
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn validate(&self, _ctx: &Context, details: &RequestDetails) -> Result<(), RuleError> {
        match details.email.as_deref() {
            Some(email) if !email.trim().is_empty() => Ok(()),
            _ => Err(RuleError::Validation(
                "email validation requires an email address".to_string(),
            )),
        }
    }

    async fn protect(
        &self,
        ctx: &Context,
        details: &RequestDetails,
    ) -> Result<RuleResult, RuleError> {
        let email = details.email.as_deref().unwrap_or_default();
        let email_types = ctx.analyzer.classify_email(email, &self.options).await?;

        let conclusion = if email_types.iter().any(|t| self.is_denied(t)) {
            Conclusion::Deny
        } else {
            Conclusion::Allow
        };

        Ok(RuleResult::run(0, conclusion, Reason::Email { email_types }))
    }

    fn to_wire(&self) -> WireRule {
        let (allow, deny) = if self.allow_list {
            (self.types.clone(), Vec::new())
        } else {
            (Vec::new(), self.types.clone())
        };
        WireRule::Email {
            mode: self.mode,
            allow,
            deny,
            require_top_level_domain: self.options.require_top_level_domain,
            allow_domain_literal: self.options.allow_domain_literal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::MockAnalyzer;
    use crate::rules::test_context;
    use std::sync::Arc;

    fn request(email: Option<&str>) -> RequestDetails {
        RequestDetails {
            ip: "203.0.113.9".to_string(),
            method: "POST".to_string(),
            email: email.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_requires_email() {
        let rule = EmailRule::new(Mode::Live, None, Some(vec![EmailType::Disposable])).unwrap();
        let ctx = test_context(Arc::new(MockAnalyzer::new()));

        assert!(rule.validate(&ctx, &request(None)).is_err());
        assert!(rule.validate(&ctx, &request(Some("  "))).is_err());
        assert!(rule.validate(&ctx, &request(Some("a@example.com"))).is_ok());
    }

    #[tokio::test]
    async fn test_deny_list() {
        let analyzer = Arc::new(MockAnalyzer::new());
        analyzer.set_email_types(vec![EmailType::Disposable]);
        let ctx = test_context(analyzer);
        let rule = EmailRule::new(Mode::Live, None, Some(vec![EmailType::Disposable])).unwrap();

        let result = rule.protect(&ctx, &request(Some("x@mailinator.com"))).await.unwrap();

        assert_eq!(result.conclusion, Conclusion::Deny);
        assert_eq!(result.ttl, 0);
        assert_eq!(
            result.reason,
            Reason::Email {
                email_types: vec![EmailType::Disposable]
            }
        );
    }

    #[tokio::test]
    async fn test_allow_list() {
        let analyzer = Arc::new(MockAnalyzer::new());
        analyzer.set_email_types(vec![EmailType::Free]);
        let ctx = test_context(analyzer.clone());
        let rule = EmailRule::new(Mode::Live, Some(vec![EmailType::Free]), None).unwrap();

        let result = rule.protect(&ctx, &request(Some("x@gmail.com"))).await.unwrap();
        assert_eq!(result.conclusion, Conclusion::Allow);

        analyzer.set_email_types(vec![EmailType::Free, EmailType::NoMxRecords]);
        let result = rule.protect(&ctx, &request(Some("x@gmail.com"))).await.unwrap();
        assert_eq!(result.conclusion, Conclusion::Deny);
    }

    #[test]
    fn test_wire_carries_options() {
        let rule = EmailRule::new(Mode::DryRun, None, Some(vec![EmailType::Invalid]))
            .unwrap()
            .with_options(EmailOptions {
                require_top_level_domain: false,
                allow_domain_literal: true,
            });

        assert_eq!(
            rule.to_wire(),
            WireRule::Email {
                mode: Mode::DryRun,
                allow: vec![],
                deny: vec![EmailType::Invalid],
                require_top_level_domain: false,
                allow_domain_literal: true,
            }
        );
    }
}
