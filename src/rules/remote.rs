use crate::client::{RateLimitAlgorithm, WireRule};
use crate::domain::Mode;

use super::priority;
use super::traits::{ConfigError, RuleType};

/// Parameters of a rule only the remote service can evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteKind {
    RateLimit {
        algorithm: RateLimitAlgorithm,
        /// Requests per window, or bucket capacity
        max: u32,
        /// Window or refill interval in seconds
        window: u64,
        refill_rate: Option<u32>,
        characteristics: Vec<String>,
    },
    Shield {
        characteristics: Vec<String>,
    },
}

/// A rule described locally but enforced by the remote service.
///
/// The pipeline skips these in the local loop and sends them with
/// `decide`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRule {
    mode: Mode,
    priority: u32,
    kind: RemoteKind,
}

impl RemoteRule {
    /// Fixed window rate limit: `max` requests per `window` seconds.
    pub fn fixed_window(mode: Mode, max: u32, window: u64) -> Result<Self, ConfigError> {
        RemoteRule::rate_limit(mode, RateLimitAlgorithm::FixedWindow, max, window, None)
    }

    /// Sliding window rate limit: `max` requests per `interval` seconds.
    pub fn sliding_window(mode: Mode, max: u32, interval: u64) -> Result<Self, ConfigError> {
        RemoteRule::rate_limit(mode, RateLimitAlgorithm::SlidingWindow, max, interval, None)
    }

    /// Token bucket: `refill_rate` tokens every `interval` seconds, up to
    /// `capacity`.
    pub fn token_bucket(
        mode: Mode,
        refill_rate: u32,
        interval: u64,
        capacity: u32,
    ) -> Result<Self, ConfigError> {
        if refill_rate == 0 {
            return Err(ConfigError::NotPositive {
                rule: "rate_limit",
                field: "refill_rate",
            });
        }
        RemoteRule::rate_limit(
            mode,
            RateLimitAlgorithm::TokenBucket,
            capacity,
            interval,
            Some(refill_rate),
        )
    }

    pub fn shield(mode: Mode) -> Self {
        RemoteRule {
            mode,
            priority: priority::SHIELD,
            kind: RemoteKind::Shield {
                characteristics: Vec::new(),
            },
        }
    }

    fn rate_limit(
        mode: Mode,
        algorithm: RateLimitAlgorithm,
        max: u32,
        window: u64,
        refill_rate: Option<u32>,
    ) -> Result<Self, ConfigError> {
        if max == 0 {
            let field = match algorithm {
                RateLimitAlgorithm::TokenBucket => "capacity",
                _ => "max",
            };
            return Err(ConfigError::NotPositive {
                rule: "rate_limit",
                field,
            });
        }
        if window == 0 {
            let field = match algorithm {
                RateLimitAlgorithm::FixedWindow => "window",
                _ => "interval",
            };
            return Err(ConfigError::NotPositive {
                rule: "rate_limit",
                field,
            });
        }

        Ok(RemoteRule {
            mode,
            priority: priority::RATE_LIMIT,
            kind: RemoteKind::RateLimit {
                algorithm,
                max,
                window,
                refill_rate,
                characteristics: Vec::new(),
            },
        })
    }

    /// Key the rule on these characteristics instead of the global ones.
    pub fn with_characteristics(mut self, characteristics: Vec<String>) -> Self {
        match &mut self.kind {
            RemoteKind::RateLimit {
                characteristics: c, ..
            }
            | RemoteKind::Shield { characteristics: c } => *c = characteristics,
        }
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn kind(&self) -> &RemoteKind {
        &self.kind
    }

    pub fn rule_type(&self) -> RuleType {
        match self.kind {
            RemoteKind::RateLimit { .. } => RuleType::RateLimit,
            RemoteKind::Shield { .. } => RuleType::Shield,
        }
    }

    pub fn to_wire(&self) -> WireRule {
        match &self.kind {
            RemoteKind::RateLimit {
                algorithm,
                max,
                window,
                refill_rate,
                characteristics,
            } => WireRule::RateLimit {
                mode: self.mode,
                algorithm: *algorithm,
                max: *max,
                window: *window,
                refill_rate: *refill_rate,
                characteristics: characteristics.clone(),
            },
            RemoteKind::Shield { characteristics } => WireRule::Shield {
                mode: self.mode,
                characteristics: characteristics.clone(),
            },
        }
    }
}
