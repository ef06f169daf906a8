use async_trait::async_trait;

use crate::client::WireRule;
use crate::domain::{Conclusion, Context, Mode, Reason, RequestDetails, RuleResult};
use crate::rules::priority;
use crate::rules::traits::{ConfigError, LocalRule, RuleError, RuleType};

/// How long a bot denial may be served from the cache, in milliseconds.
pub const BOT_DENY_TTL_MS: u64 = 60_000;

/// Bot detection rule.
///
/// With an allow list every detected bot not on the list is denied (an
/// empty allow list denies all bots). With a deny list only the listed
/// bots are denied. Spoofed bots are always denied.
#[derive(Debug)]
pub struct BotRule {
    mode: Mode,
    priority: u32,
    allow_list: bool,
    bots: Vec<String>,
}

impl BotRule {
    pub fn new(
        mode: Mode,
        allow: Option<Vec<String>>,
        deny: Option<Vec<String>>,
    ) -> Result<Self, ConfigError> {
        let (allow_list, bots) = match (allow, deny) {
            (Some(allow), None) => (true, allow),
            (None, Some(deny)) if deny.is_empty() => {
                return Err(ConfigError::Empty {
                    rule: "bot",
                    field: "deny",
                })
            }
            (None, Some(deny)) => (false, deny),
            _ => return Err(ConfigError::AllowOrDeny { rule: "bot" }),
        };

        Ok(BotRule {
            mode,
            priority: priority::BOT,
            allow_list,
            bots: bots.into_iter().map(|b| b.to_uppercase()).collect(),
        })
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    #[inline]
    fn is_denied(&self, bot: &str) -> bool {
        let listed = self.bots.iter().any(|b| b == bot);
        listed != self.allow_list
    }
}

#[async_trait]
impl LocalRule for BotRule {
    fn rule_type(&self) -> RuleType {
        RuleType::Bot
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn validate(&self, _ctx: &Context, details: &RequestDetails) -> Result<(), RuleError> {
        if !details.headers.contains("user-agent") {
            return Err(RuleError::Validation(
                "bot detection requires a user-agent header".to_string(),
            ));
        }
        Ok(())
    }

    async fn protect(
        &self,
        ctx: &Context,
        details: &RequestDetails,
    ) -> Result<RuleResult, RuleError> {
        let report = ctx.analyzer.detect_bot(details).await?;

        let (denied, allowed): (Vec<String>, Vec<String>) = report
            .detected
            .into_iter()
            .map(|b| b.to_uppercase())
            .partition(|b| self.is_denied(b));

        let reason = Reason::Bot {
            denied: denied.clone(),
            allowed,
            verified: report.verified,
            spoofed: report.spoofed,
        };

        if !denied.is_empty() || report.spoofed {
            Ok(RuleResult::run(BOT_DENY_TTL_MS, Conclusion::Deny, reason))
        } else {
            Ok(RuleResult::run(0, Conclusion::Allow, reason))
        }
    }

    fn to_wire(&self) -> WireRule {
        let (allow, deny) = if self.allow_list {
            (self.bots.clone(), Vec::new())
        } else {
            (Vec::new(), self.bots.clone())
        };
        WireRule::Bot {
            mode: self.mode,
            allow,
            deny,
        }
    }
}
