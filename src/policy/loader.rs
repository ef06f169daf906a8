use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::analyze::EmailOptions;
use crate::domain::{EmailType, Mode};
use crate::filter::Expression;
use crate::rules::{
    BotRule, ConfigError, EmailRule, FilterRule, RemoteRule, Rule, SensitiveInfoRule,
};

/// Errors that can occur while loading a rule file.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid rule #{index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: ConfigError,
    },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Contents of a rule file.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// One rule as written in the rule file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleDef {
    Filter {
        #[serde(default)]
        mode: Mode,
        priority: Option<u32>,
        allow: Option<Vec<String>>,
        deny: Option<Vec<String>>,
    },
    Bot {
        #[serde(default)]
        mode: Mode,
        priority: Option<u32>,
        allow: Option<Vec<String>>,
        deny: Option<Vec<String>>,
    },
    Email {
        #[serde(default)]
        mode: Mode,
        priority: Option<u32>,
        allow: Option<Vec<EmailType>>,
        deny: Option<Vec<EmailType>>,
        #[serde(default = "default_true")]
        require_top_level_domain: bool,
        #[serde(default)]
        allow_domain_literal: bool,
    },
    SensitiveInfo {
        #[serde(default)]
        mode: Mode,
        priority: Option<u32>,
        allow: Option<Vec<String>>,
        deny: Option<Vec<String>>,
    },
    FixedWindow {
        #[serde(default)]
        mode: Mode,
        priority: Option<u32>,
        max: u32,
        /// Seconds
        window: u64,
        #[serde(default)]
        characteristics: Vec<String>,
    },
    SlidingWindow {
        #[serde(default)]
        mode: Mode,
        priority: Option<u32>,
        max: u32,
        /// Seconds
        interval: u64,
        #[serde(default)]
        characteristics: Vec<String>,
    },
    TokenBucket {
        #[serde(default)]
        mode: Mode,
        priority: Option<u32>,
        refill_rate: u32,
        /// Seconds
        interval: u64,
        capacity: u32,
        #[serde(default)]
        characteristics: Vec<String>,
    },
    Shield {
        #[serde(default)]
        mode: Mode,
        priority: Option<u32>,
        #[serde(default)]
        characteristics: Vec<String>,
    },
}

fn default_true() -> bool {
    true
}

impl RuleDef {
    /// Construct the rule, applying an explicit priority if one is set.
    pub fn build(self) -> Result<Rule, ConfigError> {
        let rule = match self {
            RuleDef::Filter {
                mode,
                priority,
                allow,
                deny,
            } => {
                let rule = FilterRule::new(mode, allow, deny)?;
                Rule::local(match priority {
                    Some(p) => rule.with_priority(p),
                    None => rule,
                })
            }
            RuleDef::Bot {
                mode,
                priority,
                allow,
                deny,
            } => {
                let rule = BotRule::new(mode, allow, deny)?;
                Rule::local(match priority {
                    Some(p) => rule.with_priority(p),
                    None => rule,
                })
            }
            RuleDef::Email {
                mode,
                priority,
                allow,
                deny,
                require_top_level_domain,
                allow_domain_literal,
            } => {
                let rule = EmailRule::new(mode, allow, deny)?.with_options(EmailOptions {
                    require_top_level_domain,
                    allow_domain_literal,
                });
                Rule::local(match priority {
                    Some(p) => rule.with_priority(p),
                    None => rule,
                })
            }
            RuleDef::SensitiveInfo {
                mode,
                priority,
                allow,
                deny,
            } => {
                let rule = SensitiveInfoRule::new(mode, allow, deny)?;
                Rule::local(match priority {
                    Some(p) => rule.with_priority(p),
                    None => rule,
                })
            }
            RuleDef::FixedWindow {
                mode,
                priority,
                max,
                window,
                characteristics,
            } => remote(
                RemoteRule::fixed_window(mode, max, window)?.with_characteristics(characteristics),
                priority,
            ),
            RuleDef::SlidingWindow {
                mode,
                priority,
                max,
                interval,
                characteristics,
            } => remote(
                RemoteRule::sliding_window(mode, max, interval)?
                    .with_characteristics(characteristics),
                priority,
            ),
            RuleDef::TokenBucket {
                mode,
                priority,
                refill_rate,
                interval,
                capacity,
                characteristics,
            } => remote(
                RemoteRule::token_bucket(mode, refill_rate, interval, capacity)?
                    .with_characteristics(characteristics),
                priority,
            ),
            RuleDef::Shield {
                mode,
                priority,
                characteristics,
            } => remote(
                RemoteRule::shield(mode).with_characteristics(characteristics),
                priority,
            ),
        };

        Ok(rule)
    }
}

fn remote(rule: RemoteRule, priority: Option<u32>) -> Rule {
    match priority {
        Some(p) => Rule::from(rule.with_priority(p)),
        None => Rule::from(rule),
    }
}

/// Load and validate a rule file.
pub fn load_rule_file(path: impl AsRef<Path>) -> Result<RuleFile, PolicyError> {
    let content = fs::read_to_string(path)?;
    let file: RuleFile = serde_yaml::from_str(&content)?;

    validate_rule_file(&file)?;

    Ok(file)
}

/// Load a rule file and construct its rules.
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<Rule>, PolicyError> {
    let file = load_rule_file(path)?;

    file.rules
        .into_iter()
        .enumerate()
        .map(|(index, def)| def.build().map_err(|source| PolicyError::Rule { index, source }))
        .collect()
}

/// Reject filter expressions that do not compile or appear twice.
fn validate_rule_file(file: &RuleFile) -> Result<(), PolicyError> {
    let mut seen = HashSet::new();

    for def in &file.rules {
        let RuleDef::Filter { allow, deny, .. } = def else {
            continue;
        };

        for source in allow.iter().chain(deny.iter()).flatten() {
            if let Err(e) = Expression::parse(source.as_str()) {
                return Err(PolicyError::Validation(format!(
                    "Invalid filter expression:\n{}",
                    e
                )));
            }
            if !seen.insert(source.as_str()) {
                return Err(PolicyError::Validation(format!(
                    "Duplicate filter expression: {}",
                    source
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_rules() {
        let file = write_file(
            r#"
version: "2024-06-01"
rules:
  - type: filter
    deny:
      - 'ip.src.vpn or ip.src.tor'
  - type: fixed_window
    max: 100
    window: 60
  - type: bot
    mode: DRY_RUN
    allow: []
  - type: email
    deny: [DISPOSABLE, INVALID]
    require_top_level_domain: false
  - type: sensitive_info
    priority: 9
    deny: [CREDIT_CARD_NUMBER]
  - type: shield
"#,
        );

        let rules = load_rules(file.path()).unwrap();
        let types: Vec<RuleType> = rules.iter().map(Rule::rule_type).collect();

        assert_eq!(
            types,
            vec![
                RuleType::Filter,
                RuleType::RateLimit,
                RuleType::Bot,
                RuleType::Email,
                RuleType::SensitiveInfo,
                RuleType::Shield,
            ]
        );
        assert_eq!(rules[2].mode(), Mode::DryRun);
        assert_eq!(rules[4].priority(), 9);
        assert!(rules[1].as_local().is_none());
    }

    #[test]
    fn test_rule_file_version() {
        let file = write_file("version: v2\nrules: []");

        let parsed = load_rule_file(file.path()).unwrap();

        assert_eq!(parsed.version, "v2");
        assert!(parsed.rules.is_empty());
    }

    #[test]
    fn test_bad_options() {
        let file = write_file(
            r#"
rules:
  - type: shield
  - type: filter
    allow: ['ip.src.vpn']
    deny: ['ip.src.tor']
"#,
        );

        let err = load_rules(file.path()).unwrap_err();

        assert!(matches!(err, PolicyError::Rule { index: 1, .. }));
        assert!(err.to_string().contains("exactly one of `allow` or `deny`"));
    }

    #[test]
    fn test_duplicate_filter_expression() {
        let file = write_file(
            r#"
rules:
  - type: filter
    deny: ['ip.src.vpn']
  - type: filter
    mode: DRY_RUN
    deny: ['ip.src.vpn']
"#,
        );

        let err = load_rules(file.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_invalid_filter_expression() {
        let file = write_file(
            r#"
rules:
  - type: filter
    deny: ['http.blob ~ "x"']
"#,
        );

        let err = load_rules(file.path()).unwrap_err();
        assert!(err.to_string().contains("unknown identifier"));
    }

    #[test]
    fn test_zero_window_rejected() {
        let file = write_file(
            r#"
rules:
  - type: sliding_window
    max: 10
    interval: 0
"#,
        );

        let err = load_rules(file.path()).unwrap_err();
        assert!(err.to_string().contains("interval"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_rules("/nonexistent/rules.yaml").unwrap_err();
        assert!(matches!(err, PolicyError::Io(_)));
    }
}
