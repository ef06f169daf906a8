use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured explanation attached to a decision or rule result.
///
/// One variant per rule family. The rate limit fields are consumed by
/// response header synthesis downstream and must stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    RateLimit {
        max: u32,
        remaining: u32,
        /// Seconds until the window resets
        reset: u64,
        /// Window length in seconds
        window: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reset_time: Option<DateTime<Utc>>,
    },
    Bot {
        #[serde(default)]
        allowed: Vec<String>,
        #[serde(default)]
        denied: Vec<String>,
        #[serde(default)]
        verified: bool,
        #[serde(default)]
        spoofed: bool,
    },
    Email {
        #[serde(default)]
        email_types: Vec<EmailType>,
    },
    SensitiveInfo {
        #[serde(default)]
        allowed: Vec<IdentifiedEntity>,
        #[serde(default)]
        denied: Vec<IdentifiedEntity>,
    },
    Shield {
        #[serde(default)]
        shield_triggered: bool,
    },
    Filter {
        #[serde(default)]
        matched_expressions: Vec<String>,
        #[serde(default)]
        undetermined_expressions: Vec<String>,
    },
    Edge,
    Error {
        message: String,
    },
    Generic,
}

impl Reason {
    pub fn error(message: impl Into<String>) -> Self {
        Reason::Error {
            message: message.into(),
        }
    }

    pub fn filter(matched: Vec<String>, undetermined: Vec<String>) -> Self {
        Reason::Filter {
            matched_expressions: matched,
            undetermined_expressions: undetermined,
        }
    }

    /// Short family name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Reason::RateLimit { .. } => "RATE_LIMIT",
            Reason::Bot { .. } => "BOT",
            Reason::Email { .. } => "EMAIL",
            Reason::SensitiveInfo { .. } => "SENSITIVE_INFO",
            Reason::Shield { .. } => "SHIELD",
            Reason::Filter { .. } => "FILTER",
            Reason::Edge => "EDGE",
            Reason::Error { .. } => "ERROR",
            Reason::Generic => "GENERIC",
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Reason::Error { .. })
    }

    /// Error message, if this is an error reason.
    pub fn message(&self) -> Option<&str> {
        match self {
            Reason::Error { message } => Some(message),
            _ => None,
        }
    }
}

impl Default for Reason {
    fn default() -> Self {
        Reason::Generic
    }
}

/// Classification of an email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailType {
    Disposable,
    Free,
    NoMxRecords,
    NoGravatar,
    Invalid,
}

/// A span of sensitive data found in a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedEntity {
    /// Byte offset where the entity starts
    pub start: usize,
    /// Byte offset one past the end of the entity
    pub end: usize,
    /// Entity type, e.g. "EMAIL" or "CREDIT_CARD_NUMBER"
    pub identified_type: String,
}
