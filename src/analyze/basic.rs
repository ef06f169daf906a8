use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::net::IpAddr;

use crate::domain::{EmailType, IdentifiedEntity, RequestDetails};

use super::traits::{AnalyzeError, Analyzer, BotReport, EmailOptions};

/// Characteristic naming the client IP.
pub const IP_CHARACTERISTIC: &str = "ip.src";

/// User agent fragments and the bot identifier they map to.
const BOT_SIGNATURES: &[(&str, &str)] = &[
    ("curl/", "CURL"),
    ("wget/", "WGET"),
    ("python-requests", "PYTHON_REQUESTS"),
    ("python-urllib", "PYTHON_URLLIB"),
    ("go-http-client", "GO_HTTP"),
    ("okhttp", "OKHTTP"),
    ("headlesschrome", "HEADLESS_CHROME"),
    ("googlebot", "GOOGLE_CRAWLER"),
    ("bingbot", "BING_CRAWLER"),
    ("duckduckbot", "DUCKDUCKGO_CRAWLER"),
    ("gptbot", "OPENAI_CRAWLER"),
];

const DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com",
    "guerrillamail.com",
    "10minutemail.com",
    "tempmail.com",
    "yopmail.com",
    "trashmail.com",
];

const FREE_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "icloud.com",
    "proton.me",
    "aol.com",
];

/// Self-contained heuristics that need no network access.
///
/// Fingerprints are SHA-256 digests of the characteristic values. Bot
/// detection matches user agent signatures, email classification uses
/// static domain lists, and sensitive info detection scans body tokens.
#[derive(Debug, Default, Clone)]
pub struct BasicAnalyzer;

impl BasicAnalyzer {
    pub fn new() -> Self {
        BasicAnalyzer
    }
}

#[async_trait]
impl Analyzer for BasicAnalyzer {
    fn fingerprint(
        &self,
        details: &RequestDetails,
        characteristics: &[String],
    ) -> Result<String, AnalyzeError> {
        let default = [IP_CHARACTERISTIC.to_string()];
        let characteristics = if characteristics.is_empty() {
            &default[..]
        } else {
            characteristics
        };

        let mut hasher = Sha256::new();
        for name in characteristics {
            // A missing client IP hashes as empty; every other characteristic is required.
            let value = if name == IP_CHARACTERISTIC {
                details.ip.clone()
            } else {
                characteristic_value(details, name)
                    .ok_or_else(|| AnalyzeError::MissingCharacteristic(name.clone()))?
            };
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }

        Ok(format!("fp::2::{}", hex::encode(hasher.finalize())))
    }

    async fn detect_bot(&self, details: &RequestDetails) -> Result<BotReport, AnalyzeError> {
        let user_agent = details
            .headers
            .get("user-agent")
            .unwrap_or_default()
            .to_lowercase();

        let detected = BOT_SIGNATURES
            .iter()
            .filter(|(signature, _)| user_agent.contains(signature))
            .map(|(_, name)| name.to_string())
            .collect();

        Ok(BotReport {
            detected,
            verified: false,
            spoofed: false,
        })
    }

    async fn classify_email(
        &self,
        email: &str,
        options: &EmailOptions,
    ) -> Result<Vec<EmailType>, AnalyzeError> {
        let Some((local, domain)) = email.rsplit_once('@') else {
            return Ok(vec![EmailType::Invalid]);
        };
        let domain = domain.to_lowercase();

        if !is_valid_domain(&domain, options) || local.is_empty() || local.contains(char::is_whitespace) {
            return Ok(vec![EmailType::Invalid]);
        }

        let mut types = Vec::new();
        if DISPOSABLE_DOMAINS.contains(&domain.as_str()) {
            types.push(EmailType::Disposable);
        }
        if FREE_DOMAINS.contains(&domain.as_str()) {
            types.push(EmailType::Free);
        }
        Ok(types)
    }

    fn detect_sensitive_info(&self, body: &str) -> Vec<IdentifiedEntity> {
        tokens(body)
            .filter_map(|(start, token)| {
                let identified_type = classify_token(token)?;
                Some(IdentifiedEntity {
                    start,
                    end: start + token.len(),
                    identified_type: identified_type.to_string(),
                })
            })
            .collect()
    }
}

/// Resolve a characteristic name against the request.
///
/// Supports `ip.src`, indexed header/cookie/query fields, and falls back to
/// a key in `extra`.
pub fn characteristic_value(details: &RequestDetails, name: &str) -> Option<String> {
    if name == IP_CHARACTERISTIC {
        return (!details.ip.is_empty()).then(|| details.ip.clone());
    }

    if let Some((field, key)) = indexed(name) {
        return match field {
            "http.request.headers" => details.headers.get(key),
            "http.request.cookie" => details.cookie(key).map(str::to_string),
            "http.request.uri.args" => details.query_arg(key),
            _ => None,
        };
    }

    details.extra.get(name).cloned()
}

/// Split `field["key"]` into its parts.
fn indexed(name: &str) -> Option<(&str, &str)> {
    let (field, rest) = name.split_once("[\"")?;
    let key = rest.strip_suffix("\"]")?;
    Some((field, key))
}

fn is_valid_domain(domain: &str, options: &EmailOptions) -> bool {
    if domain.starts_with('[') && domain.ends_with(']') {
        return options.allow_domain_literal
            && domain[1..domain.len() - 1].parse::<IpAddr>().is_ok();
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if options.require_top_level_domain && labels.len() < 2 {
        return false;
    }

    labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

fn tokens(body: &str) -> impl Iterator<Item = (usize, &str)> {
    let is_separator = |c: char| c.is_whitespace() || matches!(c, ',' | ';' | '"' | '\'' | '<' | '>' | '(' | ')');

    body.char_indices()
        .filter(move |&(i, c)| {
            !is_separator(c) && body[..i].chars().next_back().map_or(true, is_separator)
        })
        .map(move |(start, _)| {
            let end = body[start..]
                .find(is_separator)
                .map_or(body.len(), |offset| start + offset);
            (start, &body[start..end])
        })
}

fn classify_token(token: &str) -> Option<&'static str> {
    if let Some((local, domain)) = token.split_once('@') {
        if !local.is_empty() && is_valid_domain(domain, &EmailOptions::default()) {
            return Some("EMAIL");
        }
        return None;
    }

    if token.parse::<IpAddr>().is_ok() && token.contains(['.', ':']) {
        return Some("IP_ADDRESS");
    }

    let digits: String = token.chars().filter(char::is_ascii_digit).collect();
    let only_digits_and_separators = token
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | ' ' | '+'));

    if only_digits_and_separators && (13..=19).contains(&digits.len()) && luhn_valid(&digits) {
        return Some("CREDIT_CARD_NUMBER");
    }

    if only_digits_and_separators && (10..=15).contains(&digits.len()) {
        return Some("PHONE_NUMBER");
    }

    None
}

fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
