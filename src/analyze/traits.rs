use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

use crate::domain::{EmailType, IdentifiedEntity, RequestDetails};

/// Errors raised by analysis collaborators.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("missing characteristic: {0}")]
    MissingCharacteristic(String),

    #[error("analysis failed: {0}")]
    Failed(String),
}

/// Bots identified in a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotReport {
    /// Identifiers of detected bots, e.g. "CURL" or "GOOGLE_CRAWLER"
    pub detected: Vec<String>,
    /// The bot's identity was verified (e.g. reverse DNS)
    pub verified: bool,
    /// The request claimed to be a known bot but was not
    pub spoofed: bool,
}

/// Options controlling email classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailOptions {
    pub require_top_level_domain: bool,
    pub allow_domain_literal: bool,
}

impl Default for EmailOptions {
    fn default() -> Self {
        EmailOptions {
            require_top_level_domain: true,
            allow_domain_literal: false,
        }
    }
}

/// Scoring and fingerprinting collaborators used by the pipeline.
///
/// The algorithms behind these are not part of the decision pipeline; the
/// pipeline only consumes their structured verdicts.
#[async_trait]
pub trait Analyzer: Send + Sync + Debug {
    /// Stable key for the client, derived from the IP and the configured
    /// characteristics.
    fn fingerprint(
        &self,
        details: &RequestDetails,
        characteristics: &[String],
    ) -> Result<String, AnalyzeError>;

    async fn detect_bot(&self, details: &RequestDetails) -> Result<BotReport, AnalyzeError>;

    async fn classify_email(
        &self,
        email: &str,
        options: &EmailOptions,
    ) -> Result<Vec<EmailType>, AnalyzeError>;

    /// Sensitive entities found in a request body.
    fn detect_sensitive_info(&self, body: &str) -> Vec<IdentifiedEntity>;
}
