use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use crate::domain::{Context, Decision, Reason, RequestDetails};
use crate::rules::Rule;

use super::traits::{Client, ClientError};
use super::wire::{WireDetails, WireRule};

/// A recorded `decide` or `report` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub fingerprint: String,
    pub key: String,
    pub details: WireDetails,
    pub rules: Vec<WireRule>,
    pub decision: Option<Decision>,
}

#[derive(Debug, Clone)]
enum DecideBehavior {
    Respond(Decision),
    Fail(String),
    Hang,
}

/// Mock decision service for testing.
///
/// Records every call in wire form so tests can inspect exactly what would
/// have been sent.
#[derive(Debug)]
pub struct MockClient {
    behavior: Mutex<DecideBehavior>,
    fail_reports: Mutex<bool>,
    decide_calls: Mutex<Vec<RecordedCall>>,
    report_calls: Mutex<Vec<RecordedCall>>,
    reported: Notify,
}

impl MockClient {
    /// A client whose `decide` always allows.
    pub fn new() -> Self {
        MockClient {
            behavior: Mutex::new(DecideBehavior::Respond(Decision::allow(0, Reason::Generic, vec![]))),
            fail_reports: Mutex::new(false),
            decide_calls: Mutex::new(Vec::new()),
            report_calls: Mutex::new(Vec::new()),
            reported: Notify::new(),
        }
    }

    /// Set the decision `decide` returns (for testing).
    pub fn respond_with(&self, decision: Decision) {
        *self.behavior.lock() = DecideBehavior::Respond(decision);
    }

    /// Make `decide` fail with a transport error (for testing).
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.behavior.lock() = DecideBehavior::Fail(message.into());
    }

    /// Make `decide` never complete (for testing timeouts).
    pub fn hang(&self) {
        *self.behavior.lock() = DecideBehavior::Hang;
    }

    /// Make `report` fail (for testing).
    pub fn fail_reports(&self) {
        *self.fail_reports.lock() = true;
    }

    /// Get recorded decide calls (for assertions).
    pub fn decide_calls(&self) -> Vec<RecordedCall> {
        self.decide_calls.lock().clone()
    }

    /// Get recorded report calls (for assertions).
    pub fn report_calls(&self) -> Vec<RecordedCall> {
        self.report_calls.lock().clone()
    }

    /// Wait until at least `count` reports were recorded.
    ///
    /// Reports run in background tasks, so tests await them here.
    pub async fn wait_for_reports(&self, count: usize, timeout: Duration) -> Vec<RecordedCall> {
        let _ = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.reported.notified();
                if self.report_calls.lock().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;

        self.report_calls()
    }

    fn record(ctx: &Context, details: &RequestDetails, rules: &[Rule], decision: Option<&Decision>) -> RecordedCall {
        RecordedCall {
            fingerprint: ctx.fingerprint.clone(),
            key: ctx.key.clone(),
            details: WireDetails::from(details),
            rules: rules.iter().map(Rule::to_wire).collect(),
            decision: decision.cloned(),
        }
    }
}

impl Default for MockClient {
    fn default() -> Self {
        MockClient::new()
    }
}

#[async_trait]
impl Client for MockClient {
    async fn decide(
        &self,
        ctx: &Context,
        details: &RequestDetails,
        rules: &[Rule],
    ) -> Result<Decision, ClientError> {
        self.decide_calls
            .lock()
            .push(Self::record(ctx, details, rules, None));

        let behavior = self.behavior.lock().clone();
        match behavior {
            DecideBehavior::Respond(decision) => Ok(decision),
            DecideBehavior::Fail(message) => Err(ClientError::Other(message)),
            DecideBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(ClientError::Other("unreachable".to_string()))
            }
        }
    }

    async fn report(
        &self,
        ctx: &Context,
        details: &RequestDetails,
        decision: &Decision,
        rules: &[Rule],
    ) -> Result<(), ClientError> {
        self.report_calls
            .lock()
            .push(Self::record(ctx, details, rules, Some(decision)));
        self.reported.notify_waiters();

        if *self.fail_reports.lock() {
            return Err(ClientError::Other("report rejected".to_string()));
        }
        Ok(())
    }
}
