use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{EmailType, IdentifiedEntity, RequestDetails};

use super::traits::{AnalyzeError, Analyzer, BotReport, EmailOptions};

/// Mock analyzer for testing.
///
/// Fingerprints are `fp::<ip>` so tests can predict cache keys.
#[derive(Debug, Default)]
pub struct MockAnalyzer {
    bot_report: Mutex<BotReport>,
    email_types: Mutex<Vec<EmailType>>,
    entities: Mutex<Vec<IdentifiedEntity>>,
    fail_bot_detection: Mutex<Option<String>>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bots reported for every request (for testing).
    pub fn set_bots(&self, detected: &[&str]) {
        self.bot_report.lock().detected = detected.iter().map(|s| s.to_string()).collect();
    }

    /// Set the classification returned for every email (for testing).
    pub fn set_email_types(&self, types: Vec<EmailType>) {
        *self.email_types.lock() = types;
    }

    /// Set the entities found in every body (for testing).
    pub fn set_entities(&self, entities: Vec<IdentifiedEntity>) {
        *self.entities.lock() = entities;
    }

    /// Make bot detection fail with the given message (for testing).
    pub fn fail_bot_detection(&self, message: impl Into<String>) {
        *self.fail_bot_detection.lock() = Some(message.into());
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    fn fingerprint(
        &self,
        details: &RequestDetails,
        _characteristics: &[String],
    ) -> Result<String, AnalyzeError> {
        Ok(format!("fp::{}", details.ip))
    }

    async fn detect_bot(&self, _details: &RequestDetails) -> Result<BotReport, AnalyzeError> {
        if let Some(message) = self.fail_bot_detection.lock().clone() {
            return Err(AnalyzeError::Failed(message));
        }
        Ok(self.bot_report.lock().clone())
    }

    async fn classify_email(
        &self,
        _email: &str,
        _options: &EmailOptions,
    ) -> Result<Vec<EmailType>, AnalyzeError> {
        Ok(self.email_types.lock().clone())
    }

    fn detect_sensitive_info(&self, _body: &str) -> Vec<IdentifiedEntity> {
        self.entities.lock().clone()
    }
}
