use async_trait::async_trait;

use crate::client::WireRule;
use crate::domain::{Conclusion, Context, Mode, Reason, RequestDetails, RuleResult};
use crate::rules::priority;
use crate::rules::traits::{ConfigError, LocalRule, RuleError, RuleType};

/// Sensitive information rule.
///
/// Scans the request body for entities such as card numbers or email
/// addresses. Needs the body on the context.
#[derive(Debug)]
pub struct SensitiveInfoRule {
    mode: Mode,
    priority: u32,
    allow_list: bool,
    /// Entity types (uppercase)
    entities: Vec<String>,
}

impl SensitiveInfoRule {
    pub fn new(
        mode: Mode,
        allow: Option<Vec<String>>,
        deny: Option<Vec<String>>,
    ) -> Result<Self, ConfigError> {
        let (allow_list, entities) = match (allow, deny) {
            (Some(allow), None) => (true, allow),
            (None, Some(deny)) if deny.is_empty() => {
                return Err(ConfigError::Empty {
                    rule: "sensitive_info",
                    field: "deny",
                })
            }
            (None, Some(deny)) => (false, deny),
            _ => return Err(ConfigError::AllowOrDeny { rule: "sensitive_info" }),
        };

        Ok(SensitiveInfoRule {
            mode,
            priority: priority::SENSITIVE_INFO,
            allow_list,
            entities: entities.into_iter().map(|e| e.to_uppercase()).collect(),
        })
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    #[inline]
    fn is_denied(&self, identified_type: &str) -> bool {
        let listed = self.entities.iter().any(|e| e == identified_type);
        listed != self.allow_list
    }
}

#[async_trait]
impl LocalRule for SensitiveInfoRule {
    fn rule_type(&self) -> RuleType {
        RuleType::SensitiveInfo
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
        ctx: &Context,
        _details: &RequestDetails,
    ) -> Result<RuleResult, RuleError> {
        let body = ctx.get_body().ok_or_else(|| {
            RuleError::Execution("sensitive info detection requires a request body".to_string())
        })?;

        let (denied, allowed): (Vec<_>, Vec<_>) = ctx
            .analyzer
            .detect_sensitive_info(body)
            .into_iter()
            .partition(|entity| self.is_denied(&entity.identified_type));

        let conclusion = if denied.is_empty() {
            Conclusion::Allow
        } else {
            Conclusion::Deny
        };

        Ok(RuleResult::run(
            0,
            conclusion,
            Reason::SensitiveInfo { allowed, denied },
        ))
    }

    fn to_wire(&self) -> WireRule {
        let (allow, deny) = if self.allow_list {
            (self.entities.clone(), Vec::new())
        } else {
            (Vec::new(), self.entities.clone())
        };
        WireRule::SensitiveInfo {
            mode: self.mode,
            allow,
            deny,
        }
    }
}
